//! Announces committed write-store mutations on the bus.

use std::sync::Arc;

use healthtrack_bus::EventBusClient;
use healthtrack_core::clock::Clock;
use healthtrack_core::repository::OutboxRepository;
use healthtrack_core::{Category, DomainRecord, Envelope, Mutation};
use healthtrack_monitor::Metrics;
use tracing::{debug, warn};

/// Called by the HTTP routes after every successful commit.
///
/// Publishing never fails the caller: the outcome is a plain `bool`, and an
/// undelivered envelope stays in the outbox for the relay.
pub struct ReplicationPublisher {
    bus: Arc<EventBusClient>,
    outbox: Arc<dyn OutboxRepository>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ReplicationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationPublisher")
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

impl ReplicationPublisher {
    #[must_use]
    pub fn new(
        bus: Arc<EventBusClient>,
        outbox: Arc<dyn OutboxRepository>,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            bus,
            outbox,
            clock,
            metrics,
        }
    }

    /// Publishes a created or updated record. Returns whether it was delivered.
    pub async fn record_mutated(
        &self,
        record: &DomainRecord,
        mutation: Mutation,
        outbox_id: i64,
    ) -> bool {
        let envelope = Envelope::for_record(record, mutation, self.clock.now());
        self.dispatch(&envelope, outbox_id).await
    }

    /// Publishes a tombstone. Returns whether it was delivered.
    pub async fn record_deleted(&self, category: Category, id: i64, outbox_id: i64) -> bool {
        let envelope = Envelope::tombstone(category, id, self.clock.now());
        self.dispatch(&envelope, outbox_id).await
    }

    async fn dispatch(&self, envelope: &Envelope, outbox_id: i64) -> bool {
        let delivered = self.bus.safe_publish(envelope).await;
        if let Some(metrics) = &self.metrics {
            let outcome = if delivered { "delivered" } else { "undelivered" };
            metrics.record_publish(envelope.topic, outcome);
        }
        if !delivered {
            debug!(topic = envelope.topic.topic(), key = %envelope.key, outbox_id, "left in outbox");
            return false;
        }
        if let Err(e) = self.outbox.mark_dispatched(outbox_id).await {
            warn!(outbox_id, error = %e, "failed to mark outbox entry dispatched");
        }
        true
    }
}
