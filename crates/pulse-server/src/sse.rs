//! Bridges one `/events` HTTP response to one hub client.
//!
//! Each message becomes a `data: <message>\n\n` frame, written verbatim and
//! emitted as its own body chunk. The stream ends when the server shuts
//! down or the hub closes the mailbox. Whatever ends the session, including
//! hyper dropping the body when the peer goes away, the guard deregisters the
//! client exactly once.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use pulse_hub::{BroadcastHub, ClientId, Mailbox};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Encode one message as an SSE frame.
pub fn frame(message: &str) -> Bytes {
    let mut buf = String::with_capacity(message.len() + 8);
    buf.push_str("data: ");
    buf.push_str(message);
    buf.push_str("\n\n");
    Bytes::from(buf)
}

/// Deregisters its client when dropped.
struct SessionGuard {
    hub: Arc<BroadcastHub>,
    id: ClientId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.hub.deregister(&self.id) {
            debug!(client_id = %self.id, "session closed");
        }
    }
}

/// One connected `/events` client.
pub struct Session {
    mailbox: Mailbox,
    cancel: CancellationToken,
    guard: SessionGuard,
}

impl Session {
    /// Register a new client with `hub`. The session ends when `cancel` fires.
    pub fn open(hub: Arc<BroadcastHub>, cancel: CancellationToken) -> Self {
        let mailbox = hub.connect();
        let guard = SessionGuard {
            id: mailbox.id().clone(),
            hub,
        };
        Self {
            mailbox,
            cancel,
            guard,
        }
    }

    /// The client id registered for this session.
    pub fn id(&self) -> &ClientId {
        &self.guard.id
    }

    /// Wait for the next frame. `None` ends the stream.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!(client_id = %self.guard.id, "session cancelled by shutdown");
                None
            }
            message = self.mailbox.recv() => match message {
                Some(message) => Some(frame(&message)),
                None => {
                    debug!(client_id = %self.guard.id, "mailbox closed by hub");
                    None
                }
            },
        }
    }

    /// Turn the session into a body stream. Dropping the stream deregisters.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        futures::stream::unfold(self, |mut session| async move {
            session
                .next_frame()
                .await
                .map(|chunk| (Ok(chunk), session))
        })
    }
}

/// Build the streaming `/events` response for `session`.
pub fn response(session: Session) -> Response {
    let body = Body::from_stream(session.into_stream());
    let mut resp = body.into_response();
    let headers = resp.headers_mut();
    let _ = headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    let _ = headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    let _ = headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    let _ = headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    resp
}
