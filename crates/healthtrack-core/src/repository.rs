//! Repository abstractions for the write side, the read-side projection and
//! the transactional outbox.

use std::time::Duration;

use async_trait::async_trait;

use crate::category::Category;
use crate::envelope::Envelope;
use crate::error::DomainError;
use crate::record::{DomainRecord, RecordFields};

/// Result of a write-store mutation that committed together with an outbox
/// entry describing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    /// The committed value (the stored row, or the deleted id).
    pub value: T,
    /// Outbox entry written in the same transaction.
    pub outbox_id: i64,
}

/// Command-side store access used by the HTTP routes.
///
/// Mutations run against the write store; `list`, `find` and `count` run
/// against the read store and may lag behind recent writes.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Inserts a new record owned by `user_id`.
    async fn create(
        &self,
        user_id: i64,
        fields: RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError>;

    /// Overwrites the fields of record `id` if `user_id` owns it.
    async fn update(
        &self,
        user_id: i64,
        id: i64,
        fields: RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError>;

    /// Deletes record `id` of `category` if `user_id` owns it.
    async fn delete(
        &self,
        user_id: i64,
        category: Category,
        id: i64,
    ) -> Result<Committed<i64>, DomainError>;

    /// Lists a user's records of one category, newest first.
    async fn list(&self, user_id: i64, category: Category) -> Result<Vec<DomainRecord>, DomainError>;

    /// Loads one of the user's records.
    ///
    /// Fails with `RecordNotFound` when the id is unknown to the read store or
    /// owned by another user.
    async fn find(
        &self,
        user_id: i64,
        category: Category,
        id: i64,
    ) -> Result<DomainRecord, DomainError>;

    /// Counts a user's records of one category.
    async fn count(&self, user_id: i64, category: Category) -> Result<i64, DomainError>;
}

/// Read-store writes, performed only by the replication consumer.
#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Inserts the record unless its id already exists. Returns `true` when a
    /// row was inserted.
    async fn insert_if_absent(&self, record: &DomainRecord) -> Result<bool, DomainError>;

    /// Inserts the record or overwrites the existing row with the same id.
    async fn upsert(&self, record: &DomainRecord) -> Result<(), DomainError>;

    /// Deletes the row with this id. Returns `true` when a row was removed;
    /// a missing id is not an error.
    async fn delete(&self, category: Category, id: i64) -> Result<bool, DomainError>;

    /// Loads a projected record by id.
    async fn find(&self, category: Category, id: i64) -> Result<Option<DomainRecord>, DomainError>;
}

/// An envelope waiting in the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    /// Outbox row id.
    pub outbox_id: i64,
    /// The envelope committed with the mutation.
    pub envelope: Envelope,
}

/// Transactional outbox on the write store.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Undispatched entries produced at least `settle` ago, oldest first.
    ///
    /// An entry is left out while a newer entry exists for the same record
    /// (same topic and key); only the newest envelope of a record is relayed.
    async fn pending(&self, limit: i64, settle: Duration) -> Result<Vec<OutboxEntry>, DomainError>;

    /// Marks an entry as delivered to the bus, together with every older
    /// undispatched entry for the same record. A stale envelope must never
    /// be delivered after a newer one.
    async fn mark_dispatched(&self, outbox_id: i64) -> Result<(), DomainError>;
}
