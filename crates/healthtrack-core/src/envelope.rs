//! Event envelope: the unit carried over the bus.
//!
//! Wire contract: the message key is the stringified record id and the value
//! is the JSON record, the JSON record plus `"action": "update"` for edits, or
//! the tombstone `{ "id": <id>, "action": "delete" }`.

use chrono::{DateTime, Utc};

use crate::category::Category;
use crate::error::EnvelopeError;
use crate::event::Mutation;
use crate::record::DomainRecord;

/// Payload key naming the action of a non-create event.
pub const ACTION_KEY: &str = "action";

/// Action value for tombstones.
pub const ACTION_DELETE: &str = "delete";

/// Action value for edits of an existing record.
pub const ACTION_UPDATE: &str = "update";

/// An event in transit.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Topic the envelope is published on.
    pub topic: Category,
    /// Stringified record id.
    pub key: String,
    /// JSON-encoded record or tombstone.
    pub payload: Vec<u8>,
    /// When the producer built the envelope.
    pub produced_at: DateTime<Utc>,
}

impl Envelope {
    /// Creates an envelope from raw parts.
    #[must_use]
    pub fn new(
        topic: Category,
        key: impl Into<String>,
        payload: Vec<u8>,
        produced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            topic,
            key: key.into(),
            payload,
            produced_at,
        }
    }

    /// Builds the envelope announcing a created or updated record.
    #[must_use]
    pub fn for_record(record: &DomainRecord, mutation: Mutation, produced_at: DateTime<Utc>) -> Self {
        // Derived record types always serialize to a JSON object.
        let mut value = serde_json::to_value(record).unwrap_or_default();
        if let (Mutation::Updated, Some(object)) = (mutation, value.as_object_mut()) {
            object.insert(ACTION_KEY.into(), ACTION_UPDATE.into());
        }
        Self::new(
            record.category(),
            record.id().to_string(),
            value.to_string().into_bytes(),
            produced_at,
        )
    }

    /// Builds the tombstone announcing a deleted record.
    #[must_use]
    pub fn tombstone(category: Category, id: i64, produced_at: DateTime<Utc>) -> Self {
        let value = serde_json::json!({ "id": id, ACTION_KEY: ACTION_DELETE });
        Self::new(
            category,
            id.to_string(),
            value.to_string().into_bytes(),
            produced_at,
        )
    }

    /// Parses the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError::MalformedPayload` when the bytes are not JSON.
    pub fn payload_json(&self) -> Result<serde_json::Value, EnvelopeError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// The payload as text, for logs and line-oriented transports.
    #[must_use]
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
