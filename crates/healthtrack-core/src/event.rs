//! Replication events decoded from envelopes.

use serde_json::Value;

use crate::category::Category;
use crate::envelope::{ACTION_DELETE, ACTION_KEY, ACTION_UPDATE, Envelope};
use crate::error::EnvelopeError;
use crate::record::DomainRecord;

/// Kind of write-store mutation announced by a non-tombstone envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// A new record was inserted.
    Created,
    /// An existing record was edited.
    Updated,
}

/// What the consumer must do to the read store.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationEvent {
    /// Insert the record unless its id is already present.
    Created(DomainRecord),
    /// Insert or overwrite the record.
    Updated(DomainRecord),
    /// Remove the record with this id, if any.
    Deleted {
        /// Category of the deleted record.
        category: Category,
        /// Id of the deleted record.
        id: i64,
    },
}

impl ReplicationEvent {
    /// Decodes an envelope against the fixed schema of its topic's category.
    ///
    /// # Errors
    ///
    /// Returns an `EnvelopeError` when the payload is not a JSON object, names
    /// an unknown action, carries no usable id, or does not match the schema.
    pub fn decode(envelope: &Envelope) -> Result<Self, EnvelopeError> {
        let category = envelope.topic;
        let value = envelope.payload_json()?;
        let Value::Object(object) = &value else {
            return Err(EnvelopeError::NotAnObject);
        };
        let action = object
            .get(ACTION_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned);

        match action.as_deref() {
            Some(ACTION_DELETE) => {
                let id = match value.get("id") {
                    Some(id) => parse_id(id)?,
                    None => envelope
                        .key
                        .parse()
                        .map_err(|_| EnvelopeError::InvalidId(envelope.key.clone()))?,
                };
                Ok(ReplicationEvent::Deleted { category, id })
            }
            Some(ACTION_UPDATE) => Ok(ReplicationEvent::Updated(DomainRecord::from_json(
                category, value,
            )?)),
            None | Some("create") => Ok(ReplicationEvent::Created(DomainRecord::from_json(
                category, value,
            )?)),
            Some(other) => Err(EnvelopeError::UnknownAction(other.to_owned())),
        }
    }

    /// Category the event applies to.
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            ReplicationEvent::Created(r) | ReplicationEvent::Updated(r) => r.category(),
            ReplicationEvent::Deleted { category, .. } => *category,
        }
    }
}

/// Tombstone ids arrive either as JSON numbers or as numeric strings.
fn parse_id(value: &Value) -> Result<i64, EnvelopeError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| EnvelopeError::InvalidId(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| EnvelopeError::InvalidId(s.clone())),
        other => Err(EnvelopeError::InvalidId(other.to_string())),
    }
}
