//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::TelemetryError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Must be called at most once,
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::Recorder(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// SSE streams opened (counter).
pub const SSE_CONNECTIONS_TOTAL: &str = "sse_connections_total";
/// SSE streams closed (counter).
pub const SSE_DISCONNECTIONS_TOTAL: &str = "sse_disconnections_total";
/// Registered clients (gauge).
pub const SSE_CONNECTIONS_ACTIVE: &str = "sse_connections_active";
/// Broadcast calls (counter).
pub const SSE_BROADCASTS_TOTAL: &str = "sse_broadcasts_total";
/// Per-client deliveries dropped because a mailbox was full or closed (counter).
pub const SSE_BROADCAST_DROPS_TOTAL: &str = "sse_broadcast_drops_total";
/// Clients deregistered by the slow-client limit (counter).
pub const SSE_SLOW_CLIENT_EVICTIONS_TOTAL: &str = "sse_slow_client_evictions_total";
/// Heartbeat messages emitted (counter).
pub const HEARTBEATS_TOTAL: &str = "heartbeats_total";
