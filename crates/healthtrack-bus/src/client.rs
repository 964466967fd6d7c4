//! Event bus client and degraded-mode fallback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use healthtrack_core::{Category, Envelope};
use tracing::{info, warn};

use crate::backend::Backend;
use crate::backend::local_log::LocalLog;
use crate::backend::memory::InMemoryBroker;
use crate::backend::redis_streams::RedisStreamsBroker;
use crate::config::{BackendKind, BusConfig};
use crate::error::BusError;
use crate::handler::EnvelopeHandler;
use crate::retry::retry_with_backoff;
use crate::subscription::Subscription;

/// Receipt for a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Topic the envelope was published on.
    pub topic: Category,
    /// Backend-assigned position (stream entry id or sequence number).
    pub offset: String,
    /// Whether a delivering backend accepted the envelope.
    pub delivered: bool,
}

/// Producer and subscriber handle over the selected backend.
#[derive(Debug)]
pub struct EventBusClient {
    backend: Backend,
    publish_timeout: Duration,
    connected: AtomicBool,
}

impl EventBusClient {
    /// Selects and connects the backend described by `config`.
    ///
    /// A disabled bus goes straight to degraded mode. The broker is retried
    /// with bounded exponential backoff; when every attempt fails the client
    /// falls back to degraded mode for the rest of the process.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Io` only when the degraded log directory cannot be
    /// created.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        if !config.enabled {
            info!("event bus disabled, running in degraded mode");
            return Ok(Self::degraded(local_log(config).await?, config.publish_timeout));
        }

        let backend = match config.backend {
            BackendKind::Memory => {
                info!("using in-process event bus");
                Backend::Memory(InMemoryBroker::new(config.channel_capacity))
            }
            BackendKind::Redis => {
                match retry_with_backoff(&config.retry, "connect_event_bus", || {
                    RedisStreamsBroker::connect(config)
                })
                .await
                {
                    Ok(broker) => Backend::Redis(broker),
                    Err((attempts, e)) => {
                        let err = BusError::Unreachable {
                            attempts,
                            last_error: e.to_string(),
                        };
                        warn!(error = %err, "event bus unreachable, falling back to degraded mode");
                        Backend::LocalLog(local_log(config).await?)
                    }
                }
            }
        };
        Ok(Self::from_backend(backend, config.publish_timeout))
    }

    /// Wraps an already-built backend.
    #[must_use]
    pub fn from_backend(backend: Backend, publish_timeout: Duration) -> Self {
        Self {
            backend,
            publish_timeout,
            connected: AtomicBool::new(true),
        }
    }

    /// A client in degraded mode over `log`.
    #[must_use]
    pub fn degraded(log: LocalLog, publish_timeout: Duration) -> Self {
        Self::from_backend(Backend::LocalLog(log), publish_timeout)
    }

    /// An in-process client with default settings.
    #[must_use]
    pub fn in_memory() -> Self {
        let config = BusConfig::default();
        Self::from_backend(
            Backend::Memory(InMemoryBroker::new(config.channel_capacity)),
            config.publish_timeout,
        )
    }

    /// A degraded client whose log lives in memory.
    #[must_use]
    pub fn local_memory() -> Self {
        Self::degraded(LocalLog::in_memory(), BusConfig::default().publish_timeout)
    }

    /// Whether the client runs without a delivering backend.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.backend, Backend::LocalLog(_))
    }

    /// Name of the selected backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The degraded log, when in degraded mode.
    #[must_use]
    pub fn local_log(&self) -> Option<&LocalLog> {
        match &self.backend {
            Backend::LocalLog(log) => Some(log),
            _ => None,
        }
    }

    /// Publishes one envelope.
    ///
    /// In degraded mode the envelope is appended to the local log and the ack
    /// reports it as undelivered.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Disconnected` after [`disconnect`](Self::disconnect),
    /// or the backend's error.
    pub async fn publish(&self, envelope: &Envelope) -> Result<Ack, BusError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(BusError::Disconnected);
        }
        let topic = envelope.topic;
        match &self.backend {
            Backend::Redis(broker) => Ok(Ack {
                topic,
                offset: broker.publish(envelope).await?,
                delivered: true,
            }),
            Backend::Memory(broker) => {
                let (offset, receivers) = broker.publish(envelope);
                Ok(Ack {
                    topic,
                    offset: offset.to_string(),
                    delivered: receivers > 0,
                })
            }
            Backend::LocalLog(log) => {
                log.append(envelope).await?;
                Ok(Ack {
                    topic,
                    offset: String::new(),
                    delivered: false,
                })
            }
        }
    }

    /// Publishes without ever failing. Returns `true` only when a delivering
    /// backend accepted the envelope within the publish timeout; every error
    /// and timeout is logged and reported as `false`.
    pub async fn safe_publish(&self, envelope: &Envelope) -> bool {
        match tokio::time::timeout(self.publish_timeout, self.publish(envelope)).await {
            Ok(Ok(ack)) => ack.delivered,
            Ok(Err(e)) => {
                warn!(topic = envelope.topic.topic(), key = %envelope.key, error = %e, "publish failed");
                false
            }
            Err(_) => {
                let err = BusError::Timeout(self.publish_timeout);
                warn!(topic = envelope.topic.topic(), key = %envelope.key, error = %err, "publish failed");
                false
            }
        }
    }

    /// Starts one worker per topic feeding `handler`.
    ///
    /// In degraded mode the subscription is registered but never delivers.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Disconnected` after disconnect, or the broker's
    /// error when the consumer group cannot be set up.
    pub async fn subscribe(
        &self,
        topics: &[Category],
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<Subscription, BusError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(BusError::Disconnected);
        }
        let subscription = match &self.backend {
            Backend::Redis(broker) => broker.subscribe(topics, &handler).await?,
            Backend::Memory(broker) => broker.subscribe(topics, &handler),
            Backend::LocalLog(_) => {
                info!(topics = topics.len(), "degraded mode: subscription registered without delivery");
                Subscription::idle(topics.to_vec())
            }
        };
        info!(
            backend = self.backend_name(),
            topics = ?topics.iter().map(|t| t.topic()).collect::<Vec<_>>(),
            "subscribed"
        );
        Ok(subscription)
    }

    /// Marks the client disconnected. Idempotent.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!(backend = self.backend_name(), "event bus disconnected");
        }
    }
}

async fn local_log(config: &BusConfig) -> Result<LocalLog, BusError> {
    match &config.local_log_dir {
        Some(dir) => LocalLog::open(dir).await,
        None => Ok(LocalLog::in_memory()),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    use super::*;
    use crate::retry::RetryConfig;

    struct Forward(mpsc::UnboundedSender<Envelope>);

    #[async_trait]
    impl EnvelopeHandler for Forward {
        async fn handle(&self, envelope: Envelope) {
            let _ = self.0.send(envelope);
        }
    }

    fn tombstone(id: i64) -> Envelope {
        Envelope::tombstone(
            Category::Activity,
            id,
            Utc.with_ymd_and_hms(2024, 1, 2, 6, 5, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_disabled_bus_connects_in_degraded_mode() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let config = BusConfig {
            enabled: false,
            local_log_dir: Some(dir.path().to_path_buf()),
            ..BusConfig::default()
        };

        // Act
        let client = EventBusClient::connect(&config).await.unwrap();

        // Assert
        assert!(client.is_degraded());
        assert_eq!(client.backend_name(), "local_log");
    }

    #[tokio::test]
    async fn test_safe_publish_in_degraded_mode_logs_and_returns_false() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let config = BusConfig {
            enabled: false,
            local_log_dir: Some(dir.path().to_path_buf()),
            ..BusConfig::default()
        };
        let client = EventBusClient::connect(&config).await.unwrap();

        // Act
        let delivered = client.safe_publish(&tombstone(7)).await;

        // Assert
        assert!(!delivered);
        let entries = client
            .local_log()
            .unwrap()
            .entries(Category::Activity)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "7");
    }

    #[tokio::test]
    async fn test_unreachable_broker_falls_back_to_degraded_mode() {
        let config = BusConfig {
            broker_url: "redis://127.0.0.1:1".into(),
            local_log_dir: None,
            retry: RetryConfig::testing(),
            ..BusConfig::default()
        };

        let client = EventBusClient::connect(&config).await.unwrap();

        assert!(client.is_degraded());
        assert!(!client.safe_publish(&tombstone(1)).await);
    }

    #[tokio::test]
    async fn test_in_memory_publish_is_delivered_to_subscriber() {
        // Arrange
        let client = EventBusClient::in_memory();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = client
            .subscribe(&[Category::Activity], Arc::new(Forward(tx)))
            .await
            .unwrap();

        // Act
        let delivered = client.safe_publish(&tombstone(3)).await;

        // Assert
        assert!(delivered);
        assert_eq!(rx.recv().await.unwrap().key, "3");
        subscription.close(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_in_memory_publish_without_subscriber_is_undelivered() {
        let client = EventBusClient::in_memory();

        let ack = client.publish(&tombstone(3)).await.unwrap();

        assert!(!ack.delivered);
        assert_eq!(ack.topic, Category::Activity);
    }

    #[tokio::test]
    async fn test_degraded_subscription_never_delivers() {
        let client = EventBusClient::local_memory();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = client
            .subscribe(&[Category::Activity], Arc::new(Forward(tx)))
            .await
            .unwrap();
        client.safe_publish(&tombstone(9)).await;

        assert_eq!(subscription.worker_count(), 0);
        assert_eq!(subscription.topics(), &[Category::Activity]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_blocks_publish() {
        let client = EventBusClient::in_memory();

        client.disconnect();
        client.disconnect();

        assert!(matches!(
            client.publish(&tombstone(1)).await,
            Err(BusError::Disconnected)
        ));
        assert!(!client.safe_publish(&tombstone(1)).await);
    }
}
