//! Health Tracker Core: shared domain types.
//!
//! This crate defines the record categories, the event envelope that travels
//! over the bus, and the repository traits that the write side, the read-side
//! projection and the outbox implement. It contains no infrastructure code.

pub mod category;
pub mod clock;
pub mod envelope;
pub mod error;
pub mod event;
pub mod record;
pub mod repository;

pub use category::Category;
pub use envelope::Envelope;
pub use error::{DomainError, EnvelopeError};
pub use event::{Mutation, ReplicationEvent};
pub use record::{DomainRecord, Record, RecordFields};
