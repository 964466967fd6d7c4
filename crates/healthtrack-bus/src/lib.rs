//! Event bus client for the health tracker.
//!
//! The client picks one backend when the process starts:
//!
//! - a Redis Streams broker, reached with bounded exponential backoff;
//! - an in-process broadcast broker for single-process deployments;
//! - a local degraded log that records envelopes but never delivers them.
//!
//! When the broker cannot be reached the client falls back to the local log
//! and stays there for the life of the process.

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod retry;
pub mod subscription;

pub use backend::local_log::{LocalLog, LocalLogEntry};
pub use client::{Ack, EventBusClient};
pub use config::{BackendKind, BusConfig};
pub use error::BusError;
pub use handler::EnvelopeHandler;
pub use retry::RetryConfig;
pub use subscription::Subscription;
