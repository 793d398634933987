//! Client identity and the bounded per-client mailbox.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Mailbox capacity used when none is configured.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 10;

/// Opaque, unique client identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Result of a single non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message was enqueued.
    Delivered,
    /// The mailbox was at capacity; the message was dropped.
    Full,
    /// The reader is gone; the message was dropped.
    Closed,
}

/// Write side of a client's mailbox, owned by the hub once registered.
///
/// Dropping the handle closes the mailbox: the paired [`Mailbox`] drains
/// whatever is still queued and then reports end-of-stream.
#[derive(Debug)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::Sender<Arc<str>>,
    dropped: u64,
}

impl ClientHandle {
    /// Create a handle with a fresh id and its paired mailbox.
    pub fn new(capacity: usize) -> (Self, Mailbox) {
        Self::with_id(ClientId::new(), capacity)
    }

    /// Create a handle with an explicit id. A capacity of zero is raised to one.
    pub(crate) fn with_id(id: ClientId, capacity: usize) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: id.clone(),
            tx,
            dropped: 0,
        };
        (handle, Mailbox { id, rx })
    }

    /// The client's id.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Try to enqueue without waiting. Failed attempts count as drops.
    pub fn offer(&mut self, message: &Arc<str>) -> Delivery {
        match self.tx.try_send(Arc::clone(message)) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                Delivery::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped += 1;
                Delivery::Closed
            }
        }
    }

    /// Messages dropped for this client so far.
    pub fn drop_count(&self) -> u64 {
        self.dropped
    }
}

/// Read side of a client's mailbox, drained by the client's session.
#[derive(Debug)]
pub struct Mailbox {
    id: ClientId,
    rx: mpsc::Receiver<Arc<str>>,
}

impl Mailbox {
    /// Id of the client this mailbox belongs to.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Wait for the next message; `None` once the hub has closed the mailbox
    /// and every queued message has been taken.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Result<Arc<str>, TryRecvError> {
        self.rx.try_recv()
    }

    /// Whether the write side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }

    /// Drain everything currently queued.
    #[cfg(test)]
    pub(crate) fn drain(&mut self) -> Vec<Arc<str>> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> Arc<str> {
        Arc::from(text)
    }

    #[test]
    fn client_ids_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("client_"));
    }

    #[test]
    fn client_id_display_matches_inner() {
        let id = ClientId::from("c1");
        assert_eq!(id.to_string(), "c1");
        assert_eq!(id, ClientId::from(String::from("c1")));
    }

    #[test]
    fn handle_and_mailbox_share_id() {
        let (handle, mailbox) = ClientHandle::new(4);
        assert_eq!(handle.id(), mailbox.id());
    }

    #[tokio::test]
    async fn offer_then_recv() {
        let (mut handle, mut mailbox) = ClientHandle::new(4);
        assert_eq!(handle.offer(&msg("hello")), Delivery::Delivered);
        assert_eq!(&*mailbox.recv().await.unwrap(), "hello");
        assert_eq!(handle.drop_count(), 0);
    }

    #[test]
    fn offer_to_full_mailbox_drops() {
        let (mut handle, mut mailbox) = ClientHandle::new(2);
        assert_eq!(handle.offer(&msg("a")), Delivery::Delivered);
        assert_eq!(handle.offer(&msg("b")), Delivery::Delivered);
        assert_eq!(handle.offer(&msg("c")), Delivery::Full);
        assert_eq!(handle.drop_count(), 1);

        let queued: Vec<String> = mailbox.drain().iter().map(|m| m.to_string()).collect();
        assert_eq!(queued, ["a", "b"]);
    }

    #[test]
    fn offer_after_reader_dropped_reports_closed() {
        let (mut handle, mailbox) = ClientHandle::new(2);
        drop(mailbox);
        assert_eq!(handle.offer(&msg("a")), Delivery::Closed);
        assert_eq!(handle.drop_count(), 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let (mut handle, _mailbox) = ClientHandle::new(0);
        assert_eq!(handle.offer(&msg("a")), Delivery::Delivered);
        assert_eq!(handle.offer(&msg("b")), Delivery::Full);
    }

    #[tokio::test]
    async fn dropping_handle_closes_mailbox_after_drain() {
        let (mut handle, mut mailbox) = ClientHandle::new(4);
        let _ = handle.offer(&msg("last"));
        drop(handle);

        assert!(mailbox.is_closed());
        assert_eq!(&*mailbox.recv().await.unwrap(), "last");
        assert!(mailbox.recv().await.is_none());
    }

    #[test]
    fn try_recv_on_empty_open_mailbox() {
        let (_handle, mut mailbox) = ClientHandle::new(4);
        assert_eq!(mailbox.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn fifo_order_preserved() {
        let (mut handle, mut mailbox) = ClientHandle::new(8);
        for i in 0..5 {
            let _ = handle.offer(&msg(&format!("m{i}")));
        }
        let got: Vec<String> = mailbox.drain().iter().map(|m| m.to_string()).collect();
        assert_eq!(got, ["m0", "m1", "m2", "m3", "m4"]);
    }
}
