//! Transactional outbox on the write store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use healthtrack_core::clock::Clock;
use healthtrack_core::repository::{OutboxEntry, OutboxRepository};
use healthtrack_core::{Category, DomainError, Envelope};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::warn;

use crate::infrastructure;

/// Writes an envelope to the outbox inside the caller's transaction.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` when the payload is not JSON or the
/// insert fails.
pub async fn enqueue(conn: &mut PgConnection, envelope: &Envelope) -> Result<i64, DomainError> {
    let payload = envelope
        .payload_json()
        .map_err(|e| DomainError::Infrastructure(e.to_string()))?;
    sqlx::query_scalar(
        "INSERT INTO event_outbox (topic, record_key, payload, produced_at) \
         VALUES ($1, $2, $3, $4) RETURNING outbox_id",
    )
    .bind(envelope.topic.topic())
    .bind(&envelope.key)
    .bind(Json(payload))
    .bind(envelope.produced_at)
    .fetch_one(conn)
    .await
    .map_err(infrastructure)
}

/// Outbox reader used by the publisher and the relay.
#[derive(Clone)]
pub struct PgOutbox {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PgOutbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgOutbox").field("pool", &self.pool).finish_non_exhaustive()
    }
}

impl PgOutbox {
    /// Creates an outbox over the write pool.
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

type OutboxRow = (i64, String, String, Json<serde_json::Value>, DateTime<Utc>);

#[async_trait]
impl OutboxRepository for PgOutbox {
    async fn pending(&self, limit: i64, settle: Duration) -> Result<Vec<OutboxEntry>, DomainError> {
        let cutoff = self.clock.cutoff(settle);

        let rows: Vec<OutboxRow> = sqlx::query_as(
            "SELECT o.outbox_id, o.topic, o.record_key, o.payload, o.produced_at \
             FROM event_outbox o \
             WHERE o.dispatched_at IS NULL AND o.produced_at <= $1 \
               AND NOT EXISTS ( \
                 SELECT 1 FROM event_outbox n \
                 WHERE n.topic = o.topic AND n.record_key = o.record_key \
                   AND n.outbox_id > o.outbox_id) \
             ORDER BY o.outbox_id LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;

        Ok(rows
            .into_iter()
            .filter_map(|(outbox_id, topic, key, Json(payload), produced_at)| {
                match Category::from_topic(&topic) {
                    Ok(category) => Some(OutboxEntry {
                        outbox_id,
                        envelope: Envelope::new(
                            category,
                            key,
                            payload.to_string().into_bytes(),
                            produced_at,
                        ),
                    }),
                    Err(e) => {
                        warn!(outbox_id, error = %e, "skipping outbox entry");
                        None
                    }
                }
            })
            .collect())
    }

    async fn mark_dispatched(&self, outbox_id: i64) -> Result<(), DomainError> {
        sqlx::query(
            "UPDATE event_outbox o SET dispatched_at = $2 \
             FROM event_outbox t \
             WHERE t.outbox_id = $1 \
               AND o.topic = t.topic AND o.record_key = t.record_key \
               AND o.outbox_id <= t.outbox_id AND o.dispatched_at IS NULL",
        )
        .bind(outbox_id)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }
}
