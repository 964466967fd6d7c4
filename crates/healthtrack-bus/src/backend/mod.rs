//! Bus backends. Exactly one is selected per process.

pub mod local_log;
pub mod memory;
pub mod redis_streams;

use self::local_log::LocalLog;
use self::memory::InMemoryBroker;
use self::redis_streams::RedisStreamsBroker;

/// The backend behind an [`EventBusClient`](crate::EventBusClient).
#[derive(Debug)]
pub enum Backend {
    /// Redis Streams broker.
    Redis(RedisStreamsBroker),
    /// In-process broadcast broker.
    Memory(InMemoryBroker),
    /// Degraded mode: envelopes are recorded locally and never delivered.
    LocalLog(LocalLog),
}

impl Backend {
    /// Short name for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Redis(_) => "redis",
            Backend::Memory(_) => "memory",
            Backend::LocalLog(_) => "local_log",
        }
    }
}
