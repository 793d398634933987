//! `PulseServer`: hub, router, listener, and heartbeat wired together.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use pulse_hub::BroadcastHub;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::heartbeat;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The broadcast hub every `/events` session registers with.
    pub hub: Arc<BroadcastHub>,
    /// Shutdown coordinator.
    pub shutdown: ShutdownCoordinator,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The SSE broadcast server.
pub struct PulseServer {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    shutdown: ShutdownCoordinator,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl PulseServer {
    /// Create a server with an empty hub.
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(BroadcastHub::new(config.hub_config()));
        Self {
            config,
            hub,
            shutdown: ShutdownCoordinator::new(),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        routes::build_router(AppState {
            hub: Arc::clone(&self.hub),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        })
    }

    /// The broadcast hub.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// On shutdown the listener stops accepting and open event streams end,
    /// so the task finishes once in-flight responses complete.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let app = self.router();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
            info!("listener stopped");
        });

        info!(addr = %local_addr, "pulse server listening");
        Ok((local_addr, handle))
    }

    /// Start the heartbeat producer; it stops on shutdown.
    pub fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let hub = Arc::clone(&self.hub);
        let interval = self.config.heartbeat_interval();
        let cancel = self.shutdown.token();
        info!(interval_secs = interval.as_secs(), "starting heartbeat");
        tokio::spawn(async move {
            let _ = heartbeat::run_heartbeat(hub, interval, cancel).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn hub_uses_configured_policy() {
        let server = PulseServer::new(ServerConfig {
            mailbox_capacity: 3,
            slow_client_drop_limit: Some(9),
            ..local_config()
        });
        assert_eq!(server.hub().config().mailbox_capacity, 3);
        assert_eq!(server.hub().config().slow_client_drop_limit, Some(9));
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn router_shares_server_hub() {
        let server = PulseServer::new(local_config());
        let _mailbox = server.hub().connect();

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["clients"], 1);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = PulseServer::new(local_config());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn listen_reports_bind_failure() {
        let first = PulseServer::new(local_config());
        let (addr, _handle) = first.listen().await.unwrap();

        let second = PulseServer::new(ServerConfig {
            port: addr.port(),
            ..local_config()
        });
        let err = second.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown().shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_reaches_connected_clients() {
        let server = PulseServer::new(ServerConfig {
            heartbeat_interval_secs: 1,
            ..local_config()
        });
        let mut mailbox = server.hub().connect();
        let handle = server.spawn_heartbeat();

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let got = mailbox.try_recv().unwrap();
        assert!(got.starts_with("Server time: "));

        assert!(
            server
                .shutdown()
                .graceful_shutdown(vec![handle], Duration::from_secs(1))
                .await
        );
    }
}
