//! Shared test doubles for the health tracker workspace.

mod clock;
mod outbox;
mod projection;
mod repository;

pub use clock::FixedClock;
pub use outbox::InMemoryOutbox;
pub use projection::{FailingProjectionStore, InMemoryProjectionStore};
pub use repository::{FailingRecordRepository, InMemoryRecordRepository};
