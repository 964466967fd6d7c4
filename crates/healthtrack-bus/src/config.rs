//! Bus configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Which delivering backend to try when the bus is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Redis Streams broker.
    #[default]
    Redis,
    /// In-process broadcast broker.
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown bus backend '{other}' (expected redis or memory)")),
        }
    }
}

/// Settings for [`EventBusClient::connect`](crate::EventBusClient::connect).
#[derive(Debug, Clone, PartialEq)]
pub struct BusConfig {
    /// `false` forces degraded mode without attempting a connection.
    pub enabled: bool,
    /// Backend used when enabled.
    pub backend: BackendKind,
    /// Broker URL for the Redis backend.
    pub broker_url: String,
    /// Consumer group shared by all replicas.
    pub consumer_group: String,
    /// Consumer name of this process within the group.
    pub client_id: String,
    /// Directory for degraded-mode log files. `None` keeps them in memory.
    pub local_log_dir: Option<PathBuf>,
    /// Upper bound for a single publish.
    pub publish_timeout: Duration,
    /// Backoff used to reach the broker at startup.
    pub retry: RetryConfig,
    /// How long a stream read blocks waiting for new entries.
    pub block_timeout: Duration,
    /// Maximum entries fetched per stream read.
    pub batch_size: usize,
    /// Buffer size of each in-process topic channel.
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::Redis,
            broker_url: "redis://127.0.0.1:6379".into(),
            consumer_group: "health-tracker-group".into(),
            client_id: "health-tracker".into(),
            local_log_dir: Some(PathBuf::from("bus-logs")),
            publish_timeout: Duration::from_millis(300),
            retry: RetryConfig::default(),
            block_timeout: Duration::from_secs(2),
            batch_size: 64,
            channel_capacity: 1024,
        }
    }
}
