//! `PostgreSQL` implementation of the `RecordRepository` trait.
//!
//! Mutations commit on the write store together with their outbox entry;
//! queries are served by the read store.

use std::sync::Arc;

use async_trait::async_trait;
use healthtrack_core::clock::Clock;
use healthtrack_core::repository::{Committed, RecordRepository};
use healthtrack_core::{Category, DomainError, DomainRecord, Envelope, Mutation, RecordFields};
use sqlx::{PgConnection, Row};
use tracing::debug;

use crate::dual_store::{self, DualStore, StatementKind};
use crate::{infrastructure, pg_outbox, schema};

/// PostgreSQL-backed record repository.
#[derive(Clone)]
pub struct PgRecordRepository {
    store: DualStore,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PgRecordRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgRecordRepository")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl PgRecordRepository {
    /// Creates a new `PgRecordRepository`.
    #[must_use]
    pub fn new(store: DualStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn insert_in(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
        fields: &RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError> {
        let category = fields.category();
        let sql = schema::insert_sql(category);
        dual_store::ensure_kind(&sql, StatementKind::Write)?;
        let row = schema::bind_fields(sqlx::query(&sql).bind(user_id), fields)
            .fetch_one(&mut *conn)
            .await
            .map_err(infrastructure)?;
        let record = schema::record_from_row(category, &row).map_err(infrastructure)?;
        let envelope = Envelope::for_record(&record, Mutation::Created, self.clock.now());
        let outbox_id = pg_outbox::enqueue(conn, &envelope).await?;
        Ok(Committed {
            value: record,
            outbox_id,
        })
    }

    async fn update_in(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
        id: i64,
        fields: &RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError> {
        let category = fields.category();
        let sql = schema::update_sql(category);
        dual_store::ensure_kind(&sql, StatementKind::Write)?;
        let row = schema::bind_fields(sqlx::query(&sql).bind(id).bind(user_id), fields)
            .fetch_optional(&mut *conn)
            .await
            .map_err(infrastructure)?
            .ok_or(DomainError::RecordNotFound { category, id })?;
        let record = schema::record_from_row(category, &row).map_err(infrastructure)?;
        let envelope = Envelope::for_record(&record, Mutation::Updated, self.clock.now());
        let outbox_id = pg_outbox::enqueue(conn, &envelope).await?;
        Ok(Committed {
            value: record,
            outbox_id,
        })
    }

    async fn delete_in(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
        category: Category,
        id: i64,
    ) -> Result<Committed<i64>, DomainError> {
        let sql = format!(
            "DELETE FROM {} WHERE id = $1 AND user_id = $2",
            category.table()
        );
        let affected = sqlx::query(&sql)
            .bind(id)
            .bind(user_id)
            .execute(&mut *conn)
            .await
            .map_err(infrastructure)?
            .rows_affected();
        if affected == 0 {
            return Err(DomainError::RecordNotFound { category, id });
        }
        let envelope = Envelope::tombstone(category, id, self.clock.now());
        let outbox_id = pg_outbox::enqueue(conn, &envelope).await?;
        Ok(Committed {
            value: id,
            outbox_id,
        })
    }
}

#[async_trait]
impl RecordRepository for PgRecordRepository {
    async fn create(
        &self,
        user_id: i64,
        fields: RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError> {
        fields.validate()?;
        let mut tx = self.store.begin_write().await?;
        let result = self.insert_in(&mut tx, user_id, &fields).await;
        let committed = dual_store::finish(tx, result).await?;
        debug!(category = %fields.category(), id = committed.value.id(), "record created");
        Ok(committed)
    }

    async fn update(
        &self,
        user_id: i64,
        id: i64,
        fields: RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError> {
        fields.validate()?;
        let mut tx = self.store.begin_write().await?;
        let result = self.update_in(&mut tx, user_id, id, &fields).await;
        dual_store::finish(tx, result).await
    }

    async fn delete(
        &self,
        user_id: i64,
        category: Category,
        id: i64,
    ) -> Result<Committed<i64>, DomainError> {
        let mut tx = self.store.begin_write().await?;
        let result = self.delete_in(&mut tx, user_id, category, id).await;
        dual_store::finish(tx, result).await
    }

    async fn list(&self, user_id: i64, category: Category) -> Result<Vec<DomainRecord>, DomainError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            schema::select_columns(category),
            category.table()
        );
        let rows = self.store.read(sqlx::query(&sql).bind(user_id)).await?;
        rows.iter()
            .map(|row| schema::record_from_row(category, row).map_err(infrastructure))
            .collect()
    }

    async fn find(
        &self,
        user_id: i64,
        category: Category,
        id: i64,
    ) -> Result<DomainRecord, DomainError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND user_id = $2",
            schema::select_columns(category),
            category.table()
        );
        let rows = self.store.read(sqlx::query(&sql).bind(id).bind(user_id)).await?;
        let row = rows
            .first()
            .ok_or(DomainError::RecordNotFound { category, id })?;
        schema::record_from_row(category, row).map_err(infrastructure)
    }

    async fn count(&self, user_id: i64, category: Category) -> Result<i64, DomainError> {
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {} WHERE user_id = $1",
            category.table()
        );
        let rows = self.store.read(sqlx::query(&sql).bind(user_id)).await?;
        match rows.first() {
            Some(row) => row.try_get("total").map_err(infrastructure),
            None => Ok(0),
        }
    }
}
