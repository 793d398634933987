//! Shutdown signalling for the listener, heartbeat, and open streams.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shared cancellation point for every long-running server task.
///
/// Cancelling ends the heartbeat loop, makes each open event stream finish,
/// and stops the listener accepting new connections.
#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Child-facing token; cancelled when [`shutdown`](Self::shutdown) runs.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown. Idempotent.
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("shutdown requested");
        }
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once shutdown has been triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Trigger shutdown and wait up to `timeout` for `handles` to finish.
    ///
    /// Returns `false` if the timeout elapsed; the stragglers are aborted.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) -> bool {
        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_ok()
        {
            return true;
        }

        warn!(?timeout, "shutdown timed out, aborting remaining tasks");
        for abort in aborts {
            abort.abort();
        }
        false
    }
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                let _ = sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_untriggered() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
        assert!(!coord.token().is_cancelled());
    }

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let a = coord.token();
        let b = coord.clone().token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_shutdown() {
        let coord = ShutdownCoordinator::new();
        let waiter = coord.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        coord.shutdown();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_cooperative_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let handle = tokio::spawn(async move { token.cancelled().await });

        assert!(
            coord
                .graceful_shutdown(vec![handle], Duration::from_secs(5))
                .await
        );
    }

    #[tokio::test]
    async fn graceful_shutdown_with_no_tasks() {
        let coord = ShutdownCoordinator::new();
        assert!(coord.graceful_shutdown(Vec::new(), Duration::from_secs(1)).await);
        assert!(coord.is_shutting_down());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_times_out_on_stuck_task() {
        let coord = ShutdownCoordinator::new();
        let stuck = tokio::spawn(std::future::pending::<()>());

        let finished = coord
            .graceful_shutdown(vec![stuck], Duration::from_millis(50))
            .await;
        assert!(!finished);
    }
}
