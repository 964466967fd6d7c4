//! Test projection stores: mock `ProjectionStore` implementations for tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use healthtrack_core::repository::ProjectionStore;
use healthtrack_core::{Category, DomainError, DomainRecord};

/// A projection store backed by a map keyed by `(category, id)`, with the
/// same idempotency rules as the real read store.
#[derive(Debug, Default)]
pub struct InMemoryProjectionStore {
    rows: Mutex<BTreeMap<(Category, i64), DomainRecord>>,
}

impl InMemoryProjectionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of one category, ordered by id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn rows(&self, category: Category) -> Vec<DomainRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, _), _)| *c == category)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Total number of rows across categories.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Whether the store holds no rows.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjectionStore {
    async fn insert_if_absent(&self, record: &DomainRecord) -> Result<bool, DomainError> {
        let mut rows = self.rows.lock().unwrap();
        let key = (record.category(), record.id());
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, record.clone());
        Ok(true)
    }

    async fn upsert(&self, record: &DomainRecord) -> Result<(), DomainError> {
        self.rows
            .lock()
            .unwrap()
            .insert((record.category(), record.id()), record.clone());
        Ok(())
    }

    async fn delete(&self, category: Category, id: i64) -> Result<bool, DomainError> {
        Ok(self.rows.lock().unwrap().remove(&(category, id)).is_some())
    }

    async fn find(&self, category: Category, id: i64) -> Result<Option<DomainRecord>, DomainError> {
        Ok(self.rows.lock().unwrap().get(&(category, id)).cloned())
    }
}

/// A projection store that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingProjectionStore;

#[async_trait]
impl ProjectionStore for FailingProjectionStore {
    async fn insert_if_absent(&self, _record: &DomainRecord) -> Result<bool, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn upsert(&self, _record: &DomainRecord) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn delete(&self, _category: Category, _id: i64) -> Result<bool, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn find(&self, _category: Category, _id: i64) -> Result<Option<DomainRecord>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
