//! Shared application state.

use std::sync::Arc;

use healthtrack_core::repository::RecordRepository;
use healthtrack_monitor::{Metrics, ServiceHealth};
use healthtrack_replication::ReplicationPublisher;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Command-side store access.
    pub records: Arc<dyn RecordRepository>,
    /// Announces committed mutations on the bus.
    pub publisher: Arc<ReplicationPublisher>,
    /// Per-service health registry.
    pub health: ServiceHealth,
    /// Prometheus registry.
    pub metrics: Arc<Metrics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordRepository>,
        publisher: Arc<ReplicationPublisher>,
        health: ServiceHealth,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            records,
            publisher,
            health,
            metrics,
        }
    }
}
