//! Health and metrics monitoring for the health tracker.
//!
//! [`ServiceHealth`] tracks one up/down gauge per logical service; each gauge
//! can only be written through the [`HealthHandle`] returned when its service
//! registered. [`HealthMonitor`] drives the registered [`HealthCheck`]s, and
//! [`Metrics`] owns the Prometheus registry exposed on `/metrics`.

pub mod checks;
pub mod error;
pub mod health;
pub mod metrics;
pub mod monitor;

pub use checks::{HealthCheck, StoreProbe};
pub use error::{HealthError, MetricsError};
pub use health::{HealthHandle, HealthReport, HealthState, HealthStatus, ServiceHealth};
pub use metrics::Metrics;
pub use monitor::HealthMonitor;
