//! Bus error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the event bus client and its backends.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker rejected a command or the connection failed.
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// The broker stayed unreachable for every connection attempt.
    #[error("broker unreachable after {attempts} attempts: {last_error}")]
    Unreachable {
        /// Number of attempts made.
        attempts: u32,
        /// Error returned by the final attempt.
        last_error: String,
    },

    /// A publish did not complete within the configured bound.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    /// The client was disconnected.
    #[error("event bus client is disconnected")]
    Disconnected,

    /// A stream entry lacks a field or carries a malformed one.
    #[error("malformed stream entry {id}: {reason}")]
    MalformedEntry {
        /// Stream entry id.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Local log I/O failed.
    #[error("local log error: {0}")]
    Io(#[from] std::io::Error),

    /// A local log line could not be encoded or decoded.
    #[error("local log encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
