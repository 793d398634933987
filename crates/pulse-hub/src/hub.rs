//! Client registry and broadcast fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use pulse_telemetry::metrics::{
    SSE_BROADCAST_DROPS_TOTAL, SSE_BROADCASTS_TOTAL, SSE_CONNECTIONS_ACTIVE,
    SSE_CONNECTIONS_TOTAL, SSE_DISCONNECTIONS_TOTAL, SSE_SLOW_CLIENT_EVICTIONS_TOTAL,
};
use tracing::{debug, info, warn};

use crate::client::{ClientHandle, ClientId, DEFAULT_MAILBOX_CAPACITY, Delivery, Mailbox};

/// Hub tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of each client's mailbox.
    pub mailbox_capacity: usize,
    /// Deregister a client once its lifetime drop count reaches this value.
    /// `None` keeps lagging clients registered until their connection ends.
    pub slow_client_drop_limit: Option<u64>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            slow_client_drop_limit: None,
        }
    }
}

/// Per-call summary of a broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients registered when the broadcast ran.
    pub recipients: usize,
    /// Mailboxes that accepted the message.
    pub delivered: usize,
    /// Mailboxes that were full or closed.
    pub dropped: usize,
    /// Clients deregistered by the slow-client limit.
    pub evicted: usize,
}

/// Owns every registered client and fans messages out to them.
///
/// All three operations take the same lock for their whole duration, so each
/// one observes the registry either entirely before or entirely after any
/// other. Mailboxes are closed by dropping their handle while the lock is
/// held, which is what rules out an enqueue racing a close.
pub struct BroadcastHub {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
    config: HubConfig,
}

impl BroadcastHub {
    /// Create an empty hub.
    pub fn new(config: HubConfig) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// The hub's configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Create a client with a fresh id, register it, and return its mailbox.
    pub fn connect(&self) -> Mailbox {
        let (handle, mailbox) = ClientHandle::new(self.config.mailbox_capacity);
        self.register(handle);
        mailbox
    }

    /// Add a client. Every later broadcast attempts delivery to it.
    ///
    /// Registering an id that is already present closes the previous handle.
    pub fn register(&self, handle: ClientHandle) {
        let id = handle.id().clone();
        let (replaced, active) = {
            let mut clients = self.clients.lock();
            let replaced = clients.insert(id.clone(), handle).is_some();
            (replaced, clients.len())
        };

        counter!(SSE_CONNECTIONS_TOTAL).increment(1);
        record_active(active);
        if replaced {
            warn!(client_id = %id, "client id re-registered, previous mailbox closed");
        }
        info!(client_id = %id, clients = active, "client connected");
    }

    /// Remove a client and close its mailbox.
    ///
    /// Returns `false` when the client was not registered, which makes
    /// repeated calls harmless.
    pub fn deregister(&self, id: &ClientId) -> bool {
        let (removed, active) = {
            let mut clients = self.clients.lock();
            let removed = clients.remove(id).is_some();
            (removed, clients.len())
        };

        if removed {
            counter!(SSE_DISCONNECTIONS_TOTAL).increment(1);
            record_active(active);
            info!(client_id = %id, clients = active, "client disconnected");
        } else {
            debug!(client_id = %id, "client already deregistered");
        }
        removed
    }

    /// Offer `message` to every registered client without waiting.
    ///
    /// A full or closed mailbox drops the message for that client only.
    pub fn broadcast(&self, message: impl Into<Arc<str>>) -> BroadcastReport {
        let message: Arc<str> = message.into();
        let mut report = BroadcastReport::default();
        let mut lagging: Vec<(ClientId, Delivery, u64)> = Vec::new();
        let mut evicted: Vec<(ClientId, u64)> = Vec::new();
        let active;
        {
            let mut clients = self.clients.lock();
            for handle in clients.values_mut() {
                report.recipients += 1;
                let outcome = handle.offer(&message);
                if outcome == Delivery::Delivered {
                    report.delivered += 1;
                    continue;
                }
                report.dropped += 1;
                let drops = handle.drop_count();
                if self
                    .config
                    .slow_client_drop_limit
                    .is_some_and(|limit| drops >= limit)
                {
                    evicted.push((handle.id().clone(), drops));
                } else {
                    lagging.push((handle.id().clone(), outcome, drops));
                }
            }
            for (id, _) in &evicted {
                let _ = clients.remove(id);
            }
            report.evicted = evicted.len();
            active = clients.len();
        }

        counter!(SSE_BROADCASTS_TOTAL).increment(1);
        if report.dropped > 0 {
            counter!(SSE_BROADCAST_DROPS_TOTAL).increment(report.dropped as u64);
        }
        for (id, outcome, drops) in &lagging {
            debug!(client_id = %id, ?outcome, total_drops = drops, "message dropped for client");
        }
        if !evicted.is_empty() {
            counter!(SSE_SLOW_CLIENT_EVICTIONS_TOTAL).increment(evicted.len() as u64);
            counter!(SSE_DISCONNECTIONS_TOTAL).increment(evicted.len() as u64);
            record_active(active);
            for (id, drops) in &evicted {
                warn!(client_id = %id, drops, "disconnecting slow client");
            }
        }
        debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast"
        );
        report
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Whether `id` is currently registered.
    pub fn is_registered(&self, id: &ClientId) -> bool {
        self.clients.lock().contains_key(id)
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(active: usize) {
    gauge!(SSE_CONNECTIONS_ACTIVE).set(active as f64);
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
