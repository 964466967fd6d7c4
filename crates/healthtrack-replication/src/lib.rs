//! Replication between the write store and the read store.
//!
//! The [`ReplicationPublisher`] announces committed mutations on the bus, the
//! [`OutboxRelay`] forwards whatever the publisher could not deliver, and the
//! [`ReplicationConsumer`] applies the envelopes to the read-store projection.

pub mod consumer;
pub mod error;
pub mod outbox_relay;
pub mod publisher;

pub use consumer::{ApplyOutcome, ConsumerState, ReplicationConsumer};
pub use error::ReplicationError;
pub use outbox_relay::{OutboxRelay, RelayReport};
pub use publisher::ReplicationPublisher;
