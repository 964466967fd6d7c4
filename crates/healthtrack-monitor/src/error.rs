//! Monitor error types.

use thiserror::Error;

/// Errors raised by the health registry and the checks.
#[derive(Debug, Error)]
pub enum HealthError {
    /// A service name was registered twice.
    #[error("service already registered: {0}")]
    AlreadyRegistered(String),

    /// The registry lock was poisoned by a panicking writer.
    #[error("health registry is unreadable")]
    Poisoned,

    /// A check's probe failed.
    #[error("check failed for {service}: {reason}")]
    CheckFailed {
        /// Service whose check failed.
        service: String,
        /// Failure description.
        reason: String,
    },
}

/// Errors raised while building or rendering metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Metric construction, registration or encoding failed.
    #[error("metrics error: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// The encoded exposition was not UTF-8.
    #[error("metrics exposition is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
