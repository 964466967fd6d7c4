//! Test repositories: mock `RecordRepository` implementations for tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use healthtrack_core::clock::Clock;
use healthtrack_core::repository::{Committed, RecordRepository};
use healthtrack_core::{Category, DomainError, DomainRecord, Envelope, Mutation, RecordFields};

use crate::clock::FixedClock;
use crate::outbox::InMemoryOutbox;

/// A record repository that keeps rows in memory and writes every mutation's
/// envelope to an [`InMemoryOutbox`]. Reads see writes immediately.
pub struct InMemoryRecordRepository {
    rows: Mutex<BTreeMap<(Category, i64), DomainRecord>>,
    next_id: Mutex<i64>,
    clock: Arc<dyn Clock>,
    outbox: Arc<InMemoryOutbox>,
}

impl std::fmt::Debug for InMemoryRecordRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRecordRepository")
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryRecordRepository {
    fn default() -> Self {
        Self::new(Arc::new(FixedClock::morning()))
    }
}

impl InMemoryRecordRepository {
    /// Creates an empty repository stamping rows with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            next_id: Mutex::new(0),
            clock,
            outbox: Arc::new(InMemoryOutbox::new()),
        }
    }

    /// The outbox receiving this repository's envelopes.
    #[must_use]
    pub fn outbox(&self) -> Arc<InMemoryOutbox> {
        Arc::clone(&self.outbox)
    }

    fn owned(&self, user_id: i64, category: Category, id: i64) -> Result<DomainRecord, DomainError> {
        self.rows
            .lock()
            .unwrap()
            .get(&(category, id))
            .filter(|record| record.user_id() == user_id)
            .cloned()
            .ok_or(DomainError::RecordNotFound { category, id })
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn create(
        &self,
        user_id: i64,
        fields: RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError> {
        fields.validate()?;
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            *next_id
        };
        let now = self.clock.now();
        let record = DomainRecord::from_parts(id, user_id, fields, now);
        self.rows
            .lock()
            .unwrap()
            .insert((record.category(), id), record.clone());
        let outbox_id = self
            .outbox
            .push(Envelope::for_record(&record, Mutation::Created, now));
        Ok(Committed {
            value: record,
            outbox_id,
        })
    }

    async fn update(
        &self,
        user_id: i64,
        id: i64,
        fields: RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError> {
        fields.validate()?;
        let existing = self.owned(user_id, fields.category(), id)?;
        let record = DomainRecord::from_parts(id, user_id, fields, existing.created_at());
        self.rows
            .lock()
            .unwrap()
            .insert((record.category(), id), record.clone());
        let outbox_id = self.outbox.push(Envelope::for_record(
            &record,
            Mutation::Updated,
            self.clock.now(),
        ));
        Ok(Committed {
            value: record,
            outbox_id,
        })
    }

    async fn delete(
        &self,
        user_id: i64,
        category: Category,
        id: i64,
    ) -> Result<Committed<i64>, DomainError> {
        self.owned(user_id, category, id)?;
        self.rows.lock().unwrap().remove(&(category, id));
        let outbox_id = self
            .outbox
            .push(Envelope::tombstone(category, id, self.clock.now()));
        Ok(Committed {
            value: id,
            outbox_id,
        })
    }

    async fn list(&self, user_id: i64, category: Category) -> Result<Vec<DomainRecord>, DomainError> {
        let mut records: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.category() == category && r.user_id() == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(records)
    }

    async fn find(
        &self,
        user_id: i64,
        category: Category,
        id: i64,
    ) -> Result<DomainRecord, DomainError> {
        self.owned(user_id, category, id)
    }

    async fn count(&self, user_id: i64, category: Category) -> Result<i64, DomainError> {
        let count = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.category() == category && r.user_id() == user_id)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

/// A record repository that always returns an infrastructure error. Useful
/// for testing error-handling paths.
#[derive(Debug)]
pub struct FailingRecordRepository;

#[async_trait]
impl RecordRepository for FailingRecordRepository {
    async fn create(
        &self,
        _user_id: i64,
        _fields: RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn update(
        &self,
        _user_id: i64,
        _id: i64,
        _fields: RecordFields,
    ) -> Result<Committed<DomainRecord>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn delete(
        &self,
        _user_id: i64,
        _category: Category,
        _id: i64,
    ) -> Result<Committed<i64>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn list(
        &self,
        _user_id: i64,
        _category: Category,
    ) -> Result<Vec<DomainRecord>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn find(
        &self,
        _user_id: i64,
        _category: Category,
        _id: i64,
    ) -> Result<DomainRecord, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn count(&self, _user_id: i64, _category: Category) -> Result<i64, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
