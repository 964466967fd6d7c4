//! Health checks.

use async_trait::async_trait;
use healthtrack_core::Category;
use sqlx::PgPool;

use crate::error::HealthError;
use crate::metrics::{DASHBOARD_SERVICE, WRITE_STORE_SERVICE};

/// A liveness probe for one logical service.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Service name the result is recorded under.
    fn service(&self) -> &str;

    /// Runs the probe once.
    async fn check(&self) -> Result<(), HealthError>;
}

/// Runs a trivial query against one store.
#[derive(Debug, Clone)]
pub struct StoreProbe {
    service: &'static str,
    sql: String,
    pool: PgPool,
}

impl StoreProbe {
    /// Probe for the dashboard service: `SELECT 1`.
    #[must_use]
    pub fn dashboard(pool: PgPool) -> Self {
        Self {
            service: DASHBOARD_SERVICE,
            sql: "SELECT 1".to_owned(),
            pool,
        }
    }

    /// Probe for the write store: `SELECT 1` on the write pool.
    #[must_use]
    pub fn write_store(pool: PgPool) -> Self {
        Self {
            service: WRITE_STORE_SERVICE,
            sql: "SELECT 1".to_owned(),
            pool,
        }
    }

    /// Probe for a category service: counts the rows of its table.
    #[must_use]
    pub fn category(pool: PgPool, category: Category) -> Self {
        Self {
            service: category.service(),
            sql: format!("SELECT COUNT(*) FROM {}", category.table()),
            pool,
        }
    }

    /// One probe per category plus the dashboard.
    #[must_use]
    pub fn all(pool: &PgPool) -> Vec<Self> {
        Category::ALL
            .into_iter()
            .map(|category| Self::category(pool.clone(), category))
            .chain(std::iter::once(Self::dashboard(pool.clone())))
            .collect()
    }

    /// The query this probe runs.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

#[async_trait]
impl HealthCheck for StoreProbe {
    fn service(&self) -> &str {
        self.service
    }

    async fn check(&self) -> Result<(), HealthError> {
        sqlx::query(&self.sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| HealthError::CheckFailed {
                service: self.service.to_owned(),
                reason: e.to_string(),
            })
    }
}
