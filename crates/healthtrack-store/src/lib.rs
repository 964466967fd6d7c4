//! PostgreSQL persistence for the health tracker.
//!
//! [`DualStore`] owns the write pool and the read pool. On top of it sit the
//! command-side [`PgRecordRepository`], the consumer-only
//! [`PgProjectionStore`] and the transactional outbox [`PgOutbox`].

pub mod dual_store;
pub mod pg_outbox;
pub mod pg_projection_store;
pub mod pg_record_repository;
pub mod schema;

pub use dual_store::{ConnectionStatus, DualStore, PendingMigrations, StatementKind, StoreConfig};
pub use pg_outbox::PgOutbox;
pub use pg_projection_store::PgProjectionStore;
pub use pg_record_repository::PgRecordRepository;

use healthtrack_core::DomainError;

/// Maps a driver error onto the domain's infrastructure error.
pub(crate) fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}
