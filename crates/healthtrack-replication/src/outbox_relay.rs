//! Forwards outbox entries the publisher could not deliver.

use std::sync::Arc;
use std::time::Duration;

use healthtrack_bus::EventBusClient;
use healthtrack_core::repository::OutboxRepository;
use healthtrack_monitor::Metrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ReplicationError;

/// How often the relay polls the outbox.
pub const DEFAULT_RELAY_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum age of an entry before the relay touches it, leaving the
/// publisher's own attempt time to land.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(10);

/// Entries loaded per pass.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Outcome of one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Entries delivered and marked dispatched.
    pub relayed: usize,
    /// Entries the bus did not deliver; they stay pending.
    pub undelivered: usize,
}

pub struct OutboxRelay {
    bus: Arc<EventBusClient>,
    outbox: Arc<dyn OutboxRepository>,
    metrics: Option<Arc<Metrics>>,
    batch_size: i64,
    settle: Duration,
}

impl std::fmt::Debug for OutboxRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxRelay")
            .field("batch_size", &self.batch_size)
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

impl OutboxRelay {
    #[must_use]
    pub fn new(
        bus: Arc<EventBusClient>,
        outbox: Arc<dyn OutboxRepository>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            bus,
            outbox,
            metrics,
            batch_size: DEFAULT_BATCH_SIZE,
            settle: DEFAULT_SETTLE_DELAY,
        }
    }

    #[must_use]
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn count(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_relay(outcome);
        }
    }

    /// Publishes one batch of settled entries, oldest first. Stops at the
    /// first undelivered entry. Does nothing while the bus is degraded.
    ///
    /// Entries superseded by a newer entry for the same record are never
    /// returned by the outbox, so a stale envelope is not replayed over a
    /// newer one.
    ///
    /// # Errors
    ///
    /// Returns `ReplicationError::Store` when the outbox cannot be read or an
    /// entry cannot be marked dispatched.
    pub async fn run_once(&self) -> Result<RelayReport, ReplicationError> {
        let mut report = RelayReport::default();
        if self.bus.is_degraded() {
            debug!("event bus degraded, outbox relay idle");
            return Ok(report);
        }

        for entry in self.outbox.pending(self.batch_size, self.settle).await? {
            if !self.bus.safe_publish(&entry.envelope).await {
                self.count("undelivered");
                report.undelivered += 1;
                break;
            }
            self.outbox.mark_dispatched(entry.outbox_id).await?;
            self.count("delivered");
            report.relayed += 1;
        }

        if report.relayed > 0 || report.undelivered > 0 {
            info!(relayed = report.relayed, undelivered = report.undelivered, "outbox relay pass");
        }
        Ok(report)
    }

    /// Runs a pass every `interval` until `shutdown` flips to `true`.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(?interval, "outbox relay started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!(error = %e, "outbox relay pass failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("outbox relay stopped");
        })
    }
}
