//! Replication consumer: applies bus envelopes to the read-store projection.
//!
//! Lifecycle: `Stopped -> Connecting -> Subscribed -> Running -> Stopped`.
//! Envelopes are only applied while `Running`. A worker that receives an
//! envelope during `Subscribed` waits for the transition; envelopes that
//! arrive once the consumer is `Stopped` are dropped. `stop` closes the
//! subscription before leaving `Running`, so envelopes already handed to a
//! worker are applied before the bus acknowledges them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use healthtrack_bus::{EnvelopeHandler, EventBusClient, Subscription};
use healthtrack_core::repository::ProjectionStore;
use healthtrack_core::{Category, Envelope, ReplicationEvent};
use healthtrack_monitor::Metrics;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::error::ReplicationError;

/// Consumer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Not subscribed; the initial and final state.
    Stopped,
    /// `start` claimed the consumer and is subscribing.
    Connecting,
    /// The subscription exists; workers hold envelopes until `Running`.
    Subscribed,
    /// Envelopes are applied to the projection.
    Running,
}

/// What applying one envelope did to the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A create inserted a new row.
    Inserted,
    /// A create found its id already projected.
    AlreadyPresent,
    /// An update inserted or overwrote the row.
    Upserted,
    /// A tombstone removed the row.
    Deleted,
    /// A tombstone found no row.
    DeleteMissing,
}

impl ApplyOutcome {
    /// Metric label for this outcome.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ApplyOutcome::Inserted => "inserted",
            ApplyOutcome::AlreadyPresent => "already_present",
            ApplyOutcome::Upserted => "upserted",
            ApplyOutcome::Deleted => "deleted",
            ApplyOutcome::DeleteMissing => "delete_missing",
        }
    }
}

/// Decodes envelopes and writes them to the projection.
struct Applier {
    projection: Arc<dyn ProjectionStore>,
    metrics: Option<Arc<Metrics>>,
}

impl Applier {
    async fn apply(&self, envelope: &Envelope) -> Result<ApplyOutcome, ReplicationError> {
        let outcome = match ReplicationEvent::decode(envelope)? {
            ReplicationEvent::Created(record) => {
                if self.projection.insert_if_absent(&record).await? {
                    ApplyOutcome::Inserted
                } else {
                    ApplyOutcome::AlreadyPresent
                }
            }
            ReplicationEvent::Updated(record) => {
                self.projection.upsert(&record).await?;
                ApplyOutcome::Upserted
            }
            ReplicationEvent::Deleted { category, id } => {
                if self.projection.delete(category, id).await? {
                    ApplyOutcome::Deleted
                } else {
                    ApplyOutcome::DeleteMissing
                }
            }
        };
        Ok(outcome)
    }

    /// Applies one envelope, logging and counting failures instead of
    /// returning them.
    async fn apply_logged(&self, envelope: &Envelope) {
        let topic = envelope.topic.topic();
        let label = match self.apply(envelope).await {
            Ok(outcome) => {
                debug!(topic, key = %envelope.key, ?outcome, "envelope applied");
                outcome.label()
            }
            Err(ReplicationError::Decode(e)) => {
                warn!(topic, key = %envelope.key, error = %e, "skipping undecodable envelope");
                "decode_error"
            }
            Err(e) => {
                error!(topic, key = %envelope.key, error = %e, "failed to apply envelope");
                "store_error"
            }
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_replication(topic, label);
        }
    }
}

/// Handler installed on the bus subscription.
struct Worker {
    applier: Arc<Applier>,
    state: watch::Receiver<ConsumerState>,
}

#[async_trait]
impl EnvelopeHandler for Worker {
    async fn handle(&self, envelope: Envelope) {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| matches!(s, ConsumerState::Running | ConsumerState::Stopped))
            .await
            .map(|s| *s);
        match reached {
            Ok(ConsumerState::Running) => self.applier.apply_logged(&envelope).await,
            _ => debug!(topic = envelope.topic.topic(), key = %envelope.key, "consumer stopped, envelope dropped"),
        }
    }
}

/// Subscribes to every category topic and keeps the projection current.
pub struct ReplicationConsumer {
    applier: Arc<Applier>,
    state: watch::Sender<ConsumerState>,
    subscription: Mutex<Option<Subscription>>,
}

impl std::fmt::Debug for ReplicationConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationConsumer")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ReplicationConsumer {
    /// Creates a `Stopped` consumer writing to `projection`. Outcomes are
    /// counted in `metrics` when given.
    #[must_use]
    pub fn new(projection: Arc<dyn ProjectionStore>, metrics: Option<Arc<Metrics>>) -> Self {
        let (state, _) = watch::channel(ConsumerState::Stopped);
        Self {
            applier: Arc::new(Applier {
                projection,
                metrics,
            }),
            state,
            subscription: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Subscribes to every category topic and starts applying envelopes.
    ///
    /// # Errors
    ///
    /// Returns `ReplicationError::InvalidState` unless the consumer is
    /// `Stopped`, and `ReplicationError::Bus` when the subscription fails (the
    /// consumer is then `Stopped` again).
    pub async fn start(&self, bus: &EventBusClient) -> Result<(), ReplicationError> {
        let mut actual = ConsumerState::Stopped;
        let claimed = self.state.send_if_modified(|state| {
            actual = *state;
            if *state == ConsumerState::Stopped {
                *state = ConsumerState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ReplicationError::InvalidState {
                expected: ConsumerState::Stopped,
                actual,
            });
        }

        let worker: Arc<dyn EnvelopeHandler> = Arc::new(Worker {
            applier: Arc::clone(&self.applier),
            state: self.state.subscribe(),
        });
        let subscription = match bus.subscribe(&Category::ALL, worker).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.state.send_replace(ConsumerState::Stopped);
                error!(error = %e, "replication consumer failed to subscribe");
                return Err(e.into());
            }
        };
        self.state.send_replace(ConsumerState::Subscribed);
        *self.subscription.lock().await = Some(subscription);
        self.state.send_replace(ConsumerState::Running);
        info!(backend = bus.backend_name(), "replication consumer running");
        Ok(())
    }

    /// Closes the subscription, giving workers `grace` to apply the envelope
    /// they hold, then moves to `Stopped`. Legal from any state. Returns how
    /// many workers had to be aborted.
    pub async fn stop(&self, grace: Duration) -> usize {
        let subscription = self.subscription.lock().await.take();
        let aborted = match subscription {
            Some(subscription) => subscription.close(grace).await,
            None => 0,
        };
        self.state.send_replace(ConsumerState::Stopped);
        info!(aborted, "replication consumer stopped");
        aborted
    }

    /// Applies one envelope to the projection.
    ///
    /// # Errors
    ///
    /// Returns `ReplicationError::Decode` for an undecodable envelope and
    /// `ReplicationError::Store` when the projection fails.
    pub async fn apply(&self, envelope: &Envelope) -> Result<ApplyOutcome, ReplicationError> {
        self.applier.apply(envelope).await
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use chrono::{NaiveDate, TimeZone, Utc};
    use healthtrack_core::record::{ActivityFields, SleepFields};
    use healthtrack_core::repository::RecordRepository;
    use healthtrack_core::{DomainRecord, Mutation, Record, RecordFields};
    use healthtrack_test_support::{
        FailingProjectionStore, InMemoryProjectionStore, InMemoryRecordRepository,
    };
    use tokio::sync::Notify;

    use super::*;

    /// Holds every insert until released.
    struct GatedProjection {
        inner: InMemoryProjectionStore,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ProjectionStore for GatedProjection {
        async fn insert_if_absent(
            &self,
            record: &DomainRecord,
        ) -> Result<bool, healthtrack_core::DomainError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.insert_if_absent(record).await
        }

        async fn upsert(&self, record: &DomainRecord) -> Result<(), healthtrack_core::DomainError> {
            self.inner.upsert(record).await
        }

        async fn delete(
            &self,
            category: Category,
            id: i64,
        ) -> Result<bool, healthtrack_core::DomainError> {
            self.inner.delete(category, id).await
        }

        async fn find(
            &self,
            category: Category,
            id: i64,
        ) -> Result<Option<DomainRecord>, healthtrack_core::DomainError> {
            self.inner.find(category, id).await
        }
    }

    fn sleep_record(quality: i32) -> DomainRecord {
        DomainRecord::Sleep(Record {
            id: 1,
            user_id: 9,
            fields: SleepFields {
                start_time: Utc.with_ymd_and_hms(2024, 1, 1, 22, 0, 0).unwrap(),
                end_time: Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap(),
                quality,
            },
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 6, 5, 0).unwrap(),
        })
    }

    fn created(record: &DomainRecord) -> Envelope {
        Envelope::for_record(record, Mutation::Created, record.created_at())
    }

    fn consumer_over(
        projection: Arc<InMemoryProjectionStore>,
    ) -> (ReplicationConsumer, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new().unwrap());
        let consumer = ReplicationConsumer::new(projection, Some(Arc::clone(&metrics)));
        (consumer, metrics)
    }

    async fn eventually<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_created_record_reaches_projection_through_bus() {
        // Arrange
        let repo = InMemoryRecordRepository::default();
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (consumer, metrics) = consumer_over(Arc::clone(&projection));
        let bus = EventBusClient::in_memory();
        consumer.start(&bus).await.unwrap();

        let written = repo
            .create(
                9,
                RecordFields::Activity(ActivityFields::new(
                    "running".into(),
                    30,
                    3,
                    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                )),
            )
            .await
            .unwrap()
            .value;
        let envelope = repo.outbox().entries()[0].envelope.clone();

        // Act
        let ack = bus.publish(&envelope).await.unwrap();
        eventually(|| {
            let projection = Arc::clone(&projection);
            async move { !projection.rows(Category::Activity).is_empty() }
        })
        .await;

        // Assert
        assert!(ack.delivered);
        assert_eq!(projection.rows(Category::Activity), vec![written]);
        assert_eq!(metrics.replication_count("activity-records", "inserted"), 1);
        assert_eq!(consumer.stop(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn test_replayed_create_leaves_one_row() {
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (consumer, _) = consumer_over(Arc::clone(&projection));

        let first = consumer.apply(&created(&sleep_record(4))).await.unwrap();
        let second = consumer.apply(&created(&sleep_record(4))).await.unwrap();

        assert_eq!(first, ApplyOutcome::Inserted);
        assert_eq!(second, ApplyOutcome::AlreadyPresent);
        assert_eq!(projection.len(), 1);
    }

    #[tokio::test]
    async fn test_update_overwrites_projected_row() {
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (consumer, _) = consumer_over(Arc::clone(&projection));
        consumer.apply(&created(&sleep_record(4))).await.unwrap();

        let updated = Envelope::for_record(&sleep_record(8), Mutation::Updated, Utc::now());
        let outcome = consumer.apply(&updated).await.unwrap();

        assert_eq!(outcome, ApplyOutcome::Upserted);
        assert_eq!(projection.rows(Category::Sleep), vec![sleep_record(8)]);
    }

    #[tokio::test]
    async fn test_tombstone_for_missing_activity_is_not_an_error() {
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (consumer, _) = consumer_over(Arc::clone(&projection));

        let outcome = consumer
            .apply(&Envelope::tombstone(Category::Activity, 7, Utc::now()))
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::DeleteMissing);
        assert!(projection.rows(Category::Activity).is_empty());
    }

    #[tokio::test]
    async fn test_delete_leaves_no_row_after_repeated_creates() {
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (consumer, _) = consumer_over(Arc::clone(&projection));
        consumer.apply(&created(&sleep_record(4))).await.unwrap();
        consumer.apply(&created(&sleep_record(4))).await.unwrap();

        let outcome = consumer
            .apply(&Envelope::tombstone(Category::Sleep, 1, Utc::now()))
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Deleted);
        assert!(projection.is_empty());
    }

    #[tokio::test]
    async fn test_sleep_scenario_projects_eight_hours() {
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (consumer, _) = consumer_over(Arc::clone(&projection));

        consumer.apply(&created(&sleep_record(4))).await.unwrap();

        let rows = projection.rows(Category::Sleep);
        let DomainRecord::Sleep(row) = &rows[0] else {
            panic!("expected a sleep row, got {rows:?}");
        };
        assert_eq!(row.fields.quality, 4);
        assert!((row.fields.duration_hours() - 8.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_bad_envelopes_are_counted_and_skipped() {
        // Arrange
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (consumer, metrics) = consumer_over(Arc::clone(&projection));
        let bus = EventBusClient::in_memory();
        consumer.start(&bus).await.unwrap();
        let garbage = Envelope::new(Category::Sleep, "1", b"{not json".to_vec(), Utc::now());

        // Act
        bus.publish(&garbage).await.unwrap();
        bus.publish(&created(&sleep_record(4))).await.unwrap();
        eventually(|| {
            let projection = Arc::clone(&projection);
            async move { projection.len() == 1 }
        })
        .await;

        // Assert
        assert_eq!(metrics.replication_count("sleep-records", "decode_error"), 1);
        assert_eq!(metrics.replication_count("sleep-records", "inserted"), 1);
        consumer.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_store_failures_are_counted_not_raised() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let applier = Applier {
            projection: Arc::new(FailingProjectionStore),
            metrics: Some(Arc::clone(&metrics)),
        };

        applier.apply_logged(&created(&sleep_record(4))).await;

        assert_eq!(metrics.replication_count("sleep-records", "store_error"), 1);
    }

    #[tokio::test]
    async fn test_start_is_only_legal_from_stopped() {
        // Arrange
        let (consumer, _) = consumer_over(Arc::new(InMemoryProjectionStore::new()));
        let bus = EventBusClient::in_memory();

        // Act
        consumer.start(&bus).await.unwrap();
        let second = consumer.start(&bus).await;
        consumer.stop(Duration::from_secs(1)).await;
        let restarted = consumer.start(&bus).await;

        // Assert
        assert!(matches!(
            second,
            Err(ReplicationError::InvalidState {
                expected: ConsumerState::Stopped,
                actual: ConsumerState::Running
            })
        ));
        assert!(restarted.is_ok());
        assert_eq!(consumer.state(), ConsumerState::Running);
    }

    #[tokio::test]
    async fn test_stop_is_legal_from_any_state() {
        let (consumer, _) = consumer_over(Arc::new(InMemoryProjectionStore::new()));

        assert_eq!(consumer.stop(Duration::from_millis(10)).await, 0);
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn test_subscribe_failure_returns_to_stopped() {
        let (consumer, _) = consumer_over(Arc::new(InMemoryProjectionStore::new()));
        let bus = EventBusClient::in_memory();
        bus.disconnect();

        let result = consumer.start(&bus).await;

        assert!(matches!(result, Err(ReplicationError::Bus(_))));
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }

    #[tokio::test]
    async fn test_degraded_bus_runs_without_delivering() {
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (consumer, _) = consumer_over(Arc::clone(&projection));
        let bus = EventBusClient::local_memory();

        consumer.start(&bus).await.unwrap();
        let delivered = bus.safe_publish(&created(&sleep_record(4))).await;

        assert!(!delivered);
        assert_eq!(consumer.state(), ConsumerState::Running);
        assert!(projection.is_empty());
    }

    #[tokio::test]
    async fn test_worker_waits_for_running_and_drops_after_stop() {
        // Arrange
        let projection = Arc::new(InMemoryProjectionStore::new());
        let (state, receiver) = watch::channel(ConsumerState::Subscribed);
        let worker = Arc::new(Worker {
            applier: Arc::new(Applier {
                projection: projection.clone(),
                metrics: None,
            }),
            state: receiver,
        });

        // Act: an envelope arriving before Running is held back.
        let pending = tokio::spawn({
            let worker = Arc::clone(&worker);
            async move { worker.handle(created(&sleep_record(4))).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let applied_early = !projection.is_empty();
        state.send_replace(ConsumerState::Running);
        pending.await.unwrap();
        let applied_when_running = projection.len();

        state.send_replace(ConsumerState::Stopped);
        worker
            .handle(Envelope::tombstone(Category::Sleep, 1, Utc::now()))
            .await;

        // Assert
        assert!(!applied_early);
        assert_eq!(applied_when_running, 1);
        assert_eq!(projection.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_applies_envelope_held_by_worker_before_stopping() {
        // Arrange
        let projection = Arc::new(GatedProjection {
            inner: InMemoryProjectionStore::new(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let consumer = Arc::new(ReplicationConsumer::new(projection.clone(), None));
        let bus = EventBusClient::in_memory();
        consumer.start(&bus).await.unwrap();
        bus.publish(&created(&sleep_record(4))).await.unwrap();
        projection.entered.notified().await;

        // Act
        let stopping = tokio::spawn({
            let consumer = Arc::clone(&consumer);
            async move { consumer.stop(Duration::from_secs(5)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let state_while_draining = consumer.state();
        projection.release.notify_one();
        let aborted = stopping.await.unwrap();

        // Assert
        assert_eq!(state_while_draining, ConsumerState::Running);
        assert_eq!(aborted, 0);
        assert_eq!(consumer.state(), ConsumerState::Stopped);
        assert_eq!(projection.inner.rows(Category::Sleep), vec![sleep_record(4)]);
    }
}
