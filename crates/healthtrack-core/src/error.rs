//! Domain error types.

use thiserror::Error;

use crate::category::Category;

/// Top-level domain error type shared by the stores and the HTTP layer.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A record was not found, or it belongs to another user.
    #[error("{category} record not found: {id}")]
    RecordNotFound {
        /// Category that was searched.
        category: Category,
        /// The record identifier.
        id: i64,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

/// Errors raised while decoding an envelope into a replication event.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The topic is not part of the fixed registry.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// The payload is not valid JSON or does not match the category schema.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The payload is JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// The payload names an action the consumer does not understand.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Neither the payload nor the key carries a usable record id.
    #[error("invalid record id: {0}")]
    InvalidId(String),
}
