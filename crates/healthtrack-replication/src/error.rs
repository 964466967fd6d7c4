//! Replication error types.

use healthtrack_bus::BusError;
use healthtrack_core::{DomainError, EnvelopeError};
use thiserror::Error;

use crate::consumer::ConsumerState;

/// Errors raised while starting the consumer or applying envelopes.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// A lifecycle call was made from the wrong state.
    #[error("consumer is {actual:?}, expected {expected:?}")]
    InvalidState {
        /// State the call requires.
        expected: ConsumerState,
        /// State the consumer was in.
        actual: ConsumerState,
    },

    /// The bus refused the subscription.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// The envelope did not decode.
    #[error("undecodable envelope: {0}")]
    Decode(#[from] EnvelopeError),

    /// The projection or outbox store failed.
    #[error("store error: {0}")]
    Store(#[from] DomainError),
}
