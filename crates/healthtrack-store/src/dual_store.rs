//! Two independent Postgres pools: the write store and the read store.
//!
//! Statements are routed by kind. Reads (`SELECT`/`WITH`) only ever reach the
//! read pool and mutations (`INSERT`/`UPDATE`/`DELETE`) only ever reach the
//! write pool, inside a transaction that is rolled back explicitly on error.

use std::time::Duration;

use healthtrack_core::DomainError;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Execute, PgPool, Postgres, Transaction};
use tracing::{info, warn};

use crate::infrastructure;

/// Connection settings for both stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Command-side database URL.
    pub write_url: String,
    /// Query-side database URL.
    pub read_url: String,
    /// Pool size of each store.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
}

/// Kind of a SQL statement, decided by its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `SELECT` or `WITH`.
    Read,
    /// `INSERT`, `UPDATE` or `DELETE`.
    Write,
    /// Anything else (DDL, `COPY`, ...).
    Other,
}

/// Classifies a statement, skipping leading whitespace and comments.
#[must_use]
pub fn classify(sql: &str) -> StatementKind {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            break;
        }
    }
    let keyword: String = rest
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase();
    match keyword.as_str() {
        "SELECT" | "WITH" => StatementKind::Read,
        "INSERT" | "UPDATE" | "DELETE" => StatementKind::Write,
        _ => StatementKind::Other,
    }
}

/// Reachability of each store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// The write store answered `SELECT 1`.
    pub write: bool,
    /// The read store answered `SELECT 1`.
    pub read: bool,
}

impl ConnectionStatus {
    /// At least one store is reachable.
    #[must_use]
    pub fn any(self) -> bool {
        self.write || self.read
    }
}

/// Stores whose migrations have not been applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMigrations {
    pub write: bool,
    pub read: bool,
}

impl PendingMigrations {
    /// Both stores still need migrating.
    pub const ALL: Self = Self {
        write: true,
        read: true,
    };

    /// Nothing left to migrate.
    #[must_use]
    pub fn is_done(self) -> bool {
        !self.write && !self.read
    }
}

/// Write pool and read pool.
#[derive(Debug, Clone)]
pub struct DualStore {
    write: PgPool,
    read: PgPool,
}

impl DualStore {
    /// Builds both pools lazily; no connection is opened until first use, so
    /// one unreachable store does not prevent startup.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` when a URL cannot be parsed.
    pub fn connect(config: &StoreConfig) -> Result<Self, DomainError> {
        let options = || {
            PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout)
        };
        let write = options().connect_lazy(&config.write_url).map_err(infrastructure)?;
        let read = options().connect_lazy(&config.read_url).map_err(infrastructure)?;
        Ok(Self { write, read })
    }

    /// Wraps existing pools.
    #[must_use]
    pub fn from_pools(write: PgPool, read: PgPool) -> Self {
        Self { write, read }
    }

    /// The command-side pool.
    #[must_use]
    pub fn write_pool(&self) -> &PgPool {
        &self.write
    }

    /// The query-side pool.
    #[must_use]
    pub fn read_pool(&self) -> &PgPool {
        &self.read
    }

    /// Probes each store with `SELECT 1`.
    pub async fn check_connection(&self) -> ConnectionStatus {
        let status = ConnectionStatus {
            write: probe(&self.write, "write").await,
            read: probe(&self.read, "read").await,
        };
        info!(write = status.write, read = status.read, "store connectivity checked");
        status
    }

    /// Applies each store's migration set: record tables and the outbox on
    /// the write store, record tables only on the read store.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` when a migration fails.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        self.migrate_write().await?;
        self.migrate_read().await
    }

    async fn migrate_write(&self) -> Result<(), DomainError> {
        sqlx::migrate!("../../migrations/write")
            .run(&self.write)
            .await
            .map_err(|e| DomainError::Infrastructure(format!("write store migration: {e}")))?;
        info!(store = "write", "migrations applied");
        Ok(())
    }

    async fn migrate_read(&self) -> Result<(), DomainError> {
        sqlx::migrate!("../../migrations/read")
            .run(&self.read)
            .await
            .map_err(|e| DomainError::Infrastructure(format!("read store migration: {e}")))?;
        info!(store = "read", "migrations applied");
        Ok(())
    }

    /// Migrates every pending store that currently answers `SELECT 1` and
    /// returns what is still pending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` when a reachable store fails to
    /// migrate.
    pub async fn migrate_reachable(
        &self,
        pending: PendingMigrations,
    ) -> Result<PendingMigrations, DomainError> {
        let mut remaining = pending;
        if pending.write && probe(&self.write, "write").await {
            self.migrate_write().await?;
            remaining.write = false;
        }
        if pending.read && probe(&self.read, "read").await {
            self.migrate_read().await?;
            remaining.read = false;
        }
        Ok(remaining)
    }

    /// Runs a read statement on the read pool.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for anything but `SELECT`/`WITH`, and
    /// `DomainError::Infrastructure` when the query fails.
    pub async fn read<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<Vec<PgRow>, DomainError> {
        ensure_kind(query.sql(), StatementKind::Read)?;
        query.fetch_all(&self.read).await.map_err(infrastructure)
    }

    /// Runs a mutation on the write pool in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for anything but
    /// `INSERT`/`UPDATE`/`DELETE`, and `DomainError::Infrastructure` when the
    /// statement fails (the transaction is rolled back).
    pub async fn write<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<Vec<PgRow>, DomainError> {
        ensure_kind(query.sql(), StatementKind::Write)?;
        let mut tx = self.begin_write().await?;
        let result = query.fetch_all(&mut *tx).await.map_err(infrastructure);
        finish(tx, result).await
    }

    /// Opens a transaction on the write pool.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` when no connection is available.
    pub async fn begin_write(&self) -> Result<Transaction<'static, Postgres>, DomainError> {
        self.write.begin().await.map_err(infrastructure)
    }

    /// Closes both pools.
    pub async fn close(&self) {
        self.write.close().await;
        self.read.close().await;
        info!("store pools closed");
    }
}

/// Commits on success and rolls back explicitly on failure.
///
/// # Errors
///
/// Returns the original error, or `DomainError::Infrastructure` when the
/// commit itself fails.
pub async fn finish<T>(
    tx: Transaction<'static, Postgres>,
    result: Result<T, DomainError>,
) -> Result<T, DomainError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(infrastructure)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

/// Rejects statements routed to the wrong pool.
///
/// # Errors
///
/// Returns `DomainError::Validation` when `sql` is not of `expected` kind.
pub fn ensure_kind(sql: &str, expected: StatementKind) -> Result<(), DomainError> {
    let actual = classify(sql);
    if actual == expected {
        Ok(())
    } else {
        Err(DomainError::Validation(format!(
            "expected a {expected:?} statement, got {actual:?}"
        )))
    }
}

async fn probe(pool: &PgPool, name: &str) -> bool {
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => true,
        Err(e) => {
            warn!(store = name, error = %e, "store unreachable");
            false
        }
    }
}
