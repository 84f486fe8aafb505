//! Event reporting for self-healing actions.
//!
//! Every decision that changes the fleet is logged and published on a
//! broadcast stream so audit consumers see the same trail the logs show.

use nodeheal_types::{EventSeverity, ResourceKey, SelfHealEvent, SelfHealEventEnvelope};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Channel capacity for the event stream
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Publishes self-healing events.
#[derive(Debug, Clone)]
pub struct EventReporter {
    tx: broadcast::Sender<SelfHealEventEnvelope>,
}

impl EventReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<SelfHealEventEnvelope> {
        self.tx.subscribe()
    }

    /// Log `event` and publish it.
    pub fn record(&self, resource: &ResourceKey, event: SelfHealEvent) {
        let envelope = SelfHealEventEnvelope::new(resource.clone(), event);
        let message = envelope.message();
        match envelope.severity {
            EventSeverity::Info => info!(
                resource = %resource,
                reason = %envelope.reason,
                "{}", message
            ),
            EventSeverity::Warning => warn!(
                resource = %resource,
                reason = %envelope.reason,
                "{}", message
            ),
        }
        // No subscribers is fine
        let _ = self.tx.send(envelope);
    }
}

impl Default for EventReporter {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
