//! Redis Streams broker.
//!
//! Each topic is a stream keyed by the topic name; an entry carries the
//! fields `key`, `value` and `produced_at`. Subscribers read through a
//! consumer group: a worker first drains the entries already delivered to it
//! but never acknowledged (id `0`), then tails new entries (`>`). An entry is
//! acknowledged once the handler returns, so delivery is at-least-once. On
//! shutdown a worker finishes the entry it is handling and leaves the rest of
//! its batch unacknowledged, to be replayed on the next subscription.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use healthtrack_core::{Category, Envelope};
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisResult};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::BusConfig;
use crate::error::BusError;
use crate::handler::EnvelopeHandler;
use crate::subscription::Subscription;

const FIELD_KEY: &str = "key";
const FIELD_VALUE: &str = "value";
const FIELD_PRODUCED_AT: &str = "produced_at";

/// Pause after a failed stream read before trying again.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Settings the broker keeps after connecting.
#[derive(Debug, Clone)]
struct StreamSettings {
    group: String,
    consumer: String,
    block_timeout: Duration,
    batch_size: usize,
    connect_timeout: Duration,
}

/// Connected Redis Streams broker.
pub struct RedisStreamsBroker {
    client: Client,
    conn: ConnectionManager,
    settings: StreamSettings,
}

impl std::fmt::Debug for RedisStreamsBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamsBroker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RedisStreamsBroker {
    /// Opens a managed connection and verifies it with `PING`.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Broker` when the URL is invalid or the broker does
    /// not answer.
    pub async fn connect(config: &BusConfig) -> Result<Self, BusError> {
        let settings = StreamSettings {
            group: config.consumer_group.clone(),
            consumer: config.client_id.clone(),
            block_timeout: config.block_timeout,
            batch_size: config.batch_size.max(1),
            connect_timeout: config.publish_timeout.max(Duration::from_millis(100)),
        };
        let client = Client::open(config.broker_url.as_str())?;
        let mut conn = client
            .get_connection_manager_with_config(
                ConnectionManagerConfig::new()
                    .set_number_of_retries(1)
                    .set_connection_timeout(settings.connect_timeout)
                    .set_response_timeout(settings.connect_timeout),
            )
            .await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(url = %config.broker_url, group = %settings.group, "connected to stream broker");
        Ok(Self {
            client,
            conn,
            settings,
        })
    }

    /// Appends the envelope to its topic stream. Returns the entry id.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Broker` when `XADD` fails.
    pub async fn publish(&self, envelope: &Envelope) -> Result<String, BusError> {
        let mut conn = self.conn.clone();
        let produced_at = envelope.produced_at.to_rfc3339();
        let fields: [(&str, &[u8]); 3] = [
            (FIELD_KEY, envelope.key.as_bytes()),
            (FIELD_VALUE, envelope.payload.as_slice()),
            (FIELD_PRODUCED_AT, produced_at.as_bytes()),
        ];
        let id: String = conn.xadd(envelope.topic.topic(), "*", &fields).await?;
        trace!(topic = envelope.topic.topic(), key = %envelope.key, stream_id = %id, "envelope appended");
        Ok(id)
    }

    /// Creates the consumer group on each topic if needed and spawns one
    /// worker per topic, each with its own connection.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Broker` when a group cannot be created or a worker
    /// connection cannot be opened.
    pub async fn subscribe(
        &self,
        topics: &[Category],
        handler: &Arc<dyn EnvelopeHandler>,
    ) -> Result<Subscription, BusError> {
        let mut conn = self.conn.clone();
        for topic in topics {
            ensure_group(&mut conn, topic.topic(), &self.settings.group).await?;
        }

        let (shutdown, _) = watch::channel(false);
        let mut workers = Vec::with_capacity(topics.len());
        for topic in topics {
            // Blocking reads must not trip the response timeout.
            let worker_conn = self
                .client
                .get_connection_manager_with_config(
                    ConnectionManagerConfig::new()
                        .set_connection_timeout(self.settings.connect_timeout)
                        .set_response_timeout(
                            self.settings.block_timeout + Duration::from_secs(2),
                        ),
                )
                .await?;
            workers.push(tokio::spawn(run_worker(
                *topic,
                worker_conn,
                self.settings.clone(),
                Arc::clone(handler),
                shutdown.subscribe(),
            )));
        }
        Ok(Subscription::new(topics.to_vec(), shutdown, workers))
    }
}

async fn ensure_group(
    conn: &mut ConnectionManager,
    stream: &str,
    group: &str,
) -> Result<(), BusError> {
    let created: RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;
    match created {
        Ok(()) => {
            info!(stream, group, "consumer group created");
            Ok(())
        }
        Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn run_worker(
    topic: Category,
    mut conn: ConnectionManager,
    settings: StreamSettings,
    handler: Arc<dyn EnvelopeHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    let stream = topic.topic();
    // "0" replays this consumer's unacknowledged entries; ">" tails new ones.
    let mut cursor = "0";
    let block_ms = usize::try_from(settings.block_timeout.as_millis()).unwrap_or(usize::MAX);

    loop {
        if *shutdown.borrow() {
            break;
        }
        let opts = StreamReadOptions::default()
            .group(&settings.group, &settings.consumer)
            .block(block_ms)
            .count(settings.batch_size);

        let keys = [stream];
        let ids = [cursor];
        let read: RedisResult<StreamReadReply> = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            read = conn.xread_options(&keys, &ids, &opts) => read,
        };

        let reply = match read {
            Ok(reply) => reply,
            Err(e) => {
                warn!(stream, error = %e, "stream read failed");
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(READ_ERROR_BACKOFF) => continue,
                }
            }
        };

        let entries: Vec<StreamId> = reply.keys.into_iter().flat_map(|key| key.ids).collect();
        if entries.is_empty() {
            if cursor == "0" {
                debug!(stream, "pending entries drained, tailing new entries");
                cursor = ">";
            }
            continue;
        }

        for entry in entries {
            if *shutdown.borrow() {
                debug!(stream, stream_id = %entry.id, "shutting down, leaving entry pending");
                break;
            }
            match parse_entry(topic, &entry) {
                Ok(envelope) => handler.handle(envelope).await,
                Err(e) => warn!(stream, error = %e, "malformed stream entry, acknowledging"),
            }
            let acked: RedisResult<i64> = conn.xack(stream, &settings.group, &[&entry.id]).await;
            if let Err(e) = acked {
                warn!(stream, stream_id = %entry.id, error = %e, "failed to acknowledge entry");
            }
        }
    }
    debug!(stream, "stream worker stopped");
}

/// Rebuilds an envelope from a stream entry.
fn parse_entry(topic: Category, entry: &StreamId) -> Result<Envelope, BusError> {
    let malformed = |reason: String| BusError::MalformedEntry {
        id: entry.id.clone(),
        reason,
    };
    let key: String = entry
        .get(FIELD_KEY)
        .ok_or_else(|| malformed(format!("missing field {FIELD_KEY}")))?;
    let payload: Vec<u8> = entry
        .get(FIELD_VALUE)
        .ok_or_else(|| malformed(format!("missing field {FIELD_VALUE}")))?;
    let produced_at: String = entry
        .get(FIELD_PRODUCED_AT)
        .ok_or_else(|| malformed(format!("missing field {FIELD_PRODUCED_AT}")))?;
    let produced_at = DateTime::parse_from_rfc3339(&produced_at)
        .map_err(|e| malformed(format!("invalid {FIELD_PRODUCED_AT}: {e}")))?
        .with_timezone(&Utc);
    Ok(Envelope::new(topic, key, payload, produced_at))
}
