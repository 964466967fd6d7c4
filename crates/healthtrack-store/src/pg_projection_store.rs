//! Read-store projection written by the replication consumer.

use async_trait::async_trait;
use healthtrack_core::repository::ProjectionStore;
use healthtrack_core::{Category, DomainError, DomainRecord};
use sqlx::PgPool;

use crate::schema::{self, OnConflict};
use crate::infrastructure;

/// PostgreSQL-backed projection over the read pool.
#[derive(Debug, Clone)]
pub struct PgProjectionStore {
    pool: PgPool,
}

impl PgProjectionStore {
    /// Creates a projection store over the read pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, record: &DomainRecord, on_conflict: OnConflict) -> Result<u64, DomainError> {
        let category = record.category();
        let sql = schema::projection_insert_sql(category, on_conflict);
        let query = sqlx::query(&sql).bind(record.id()).bind(record.user_id());
        let result = schema::bind_fields(query, &record.fields())
            .bind(record.created_at())
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProjectionStore for PgProjectionStore {
    async fn insert_if_absent(&self, record: &DomainRecord) -> Result<bool, DomainError> {
        Ok(self.insert(record, OnConflict::Ignore).await? > 0)
    }

    async fn upsert(&self, record: &DomainRecord) -> Result<(), DomainError> {
        self.insert(record, OnConflict::Update).await?;
        Ok(())
    }

    async fn delete(&self, category: Category, id: i64) -> Result<bool, DomainError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", category.table());
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, category: Category, id: i64) -> Result<Option<DomainRecord>, DomainError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            schema::select_columns(category),
            category.table()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        row.map(|row| schema::record_from_row(category, &row))
            .transpose()
            .map_err(infrastructure)
    }
}
