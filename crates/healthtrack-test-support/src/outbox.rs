//! In-memory outbox.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use healthtrack_core::repository::{OutboxEntry, OutboxRepository};
use healthtrack_core::{DomainError, Envelope};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    entries: Vec<(OutboxEntry, bool)>,
}

/// An outbox that keeps entries in memory. The settle delay passed to
/// `pending` is ignored; superseding follows the Postgres outbox.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    state: Mutex<State>,
}

impl InMemoryOutbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an envelope and returns its outbox id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn push(&self, envelope: Envelope) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let outbox_id = state.next_id;
        state.entries.push((OutboxEntry { outbox_id, envelope }, false));
        outbox_id
    }

    /// Ids of entries marked dispatched, in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn dispatched_ids(&self) -> Vec<i64> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|(_, dispatched)| *dispatched)
            .map(|(entry, _)| entry.outbox_id)
            .collect()
    }

    /// Every stored entry, dispatched or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn entries(&self) -> Vec<OutboxEntry> {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(|(entry, _)| entry.clone())
            .collect()
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutbox {
    async fn pending(&self, limit: i64, _settle: Duration) -> Result<Vec<OutboxEntry>, DomainError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state.lock().unwrap();
        Ok(state
            .entries
            .iter()
            .filter(|(entry, dispatched)| {
                !*dispatched
                    && !state.entries.iter().any(|(newer, _)| {
                        same_record(newer, entry) && newer.outbox_id > entry.outbox_id
                    })
            })
            .take(limit)
            .map(|(entry, _)| entry.clone())
            .collect())
    }

    async fn mark_dispatched(&self, outbox_id: i64) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(target) = state
            .entries
            .iter()
            .find(|(entry, _)| entry.outbox_id == outbox_id)
            .map(|(entry, _)| entry.clone())
        else {
            return Ok(());
        };
        for (entry, dispatched) in &mut state.entries {
            if same_record(entry, &target) && entry.outbox_id <= target.outbox_id {
                *dispatched = true;
            }
        }
        Ok(())
    }
}

fn same_record(a: &OutboxEntry, b: &OutboxEntry) -> bool {
    a.envelope.topic == b.envelope.topic && a.envelope.key == b.envelope.key
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use healthtrack_core::Category;

    use super::*;

    #[tokio::test]
    async fn test_dispatching_newer_entry_supersedes_older_one() {
        // Arrange
        let outbox = InMemoryOutbox::new();
        let older = outbox.push(Envelope::tombstone(Category::Sleep, 1, Utc::now()));
        let other = outbox.push(Envelope::tombstone(Category::Sleep, 2, Utc::now()));
        let newer = outbox.push(Envelope::tombstone(Category::Sleep, 1, Utc::now()));

        // Act
        let before = outbox.pending(10, Duration::ZERO).await.unwrap();
        outbox.mark_dispatched(newer).await.unwrap();

        // Assert
        let ids: Vec<_> = before.iter().map(|e| e.outbox_id).collect();
        assert_eq!(ids, vec![other, newer]);
        assert_eq!(outbox.dispatched_ids(), vec![older, newer]);
    }
}
