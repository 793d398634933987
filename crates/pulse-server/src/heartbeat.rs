//! Periodic server-time broadcast.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use metrics::counter;
use pulse_hub::BroadcastHub;
use pulse_telemetry::metrics::HEARTBEATS_TOTAL;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Heartbeat text for `now`, e.g. `Server time: 2024-01-02T03:04:05Z`.
pub fn payload<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("Server time: {}", now.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Broadcast the current time every `interval` until `cancel` fires.
///
/// The first message goes out one full interval after start. Returns the
/// number of heartbeats sent.
pub async fn run_heartbeat(
    hub: Arc<BroadcastHub>,
    interval: Duration,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() completes its first tick immediately
    let _ = ticker.tick().await;

    let mut sent = 0_u64;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(sent, "heartbeat stopped");
                return sent;
            }
            _ = ticker.tick() => {
                let report = hub.broadcast(payload(&Local::now()));
                sent += 1;
                counter!(HEARTBEATS_TOTAL).increment(1);
                debug!(recipients = report.recipients, dropped = report.dropped, "heartbeat");
            }
        }
    }
}
