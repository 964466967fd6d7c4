//! Process configuration read from the environment.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use healthtrack_bus::{BackendKind, BusConfig, RetryConfig};
use healthtrack_store::StoreConfig;

use crate::error::AppError;

/// Everything `main` needs to start the server.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub host: String,
    pub port: u16,
    pub bus: BusConfig,
    pub health_check_interval: Duration,
    pub outbox_relay_interval: Duration,
    pub shutdown_grace: Duration,
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let bus_defaults = BusConfig::default();
        let retry_defaults = RetryConfig::default();

        let store = StoreConfig {
            write_url: env.required("WRITE_DATABASE_URL")?,
            read_url: env.required("READ_DATABASE_URL")?,
            max_connections: env.parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            acquire_timeout: Duration::from_secs(5),
        };

        let retry = RetryConfig {
            max_retries: env.parsed("BUS_CONNECT_RETRIES", retry_defaults.max_retries)?,
            initial_delay: env.millis("BUS_CONNECT_INITIAL_BACKOFF_MS", retry_defaults.initial_delay)?,
            ..retry_defaults
        };

        let local_log_dir = match env.get("BUS_LOCAL_LOG_DIR") {
            Some(dir) if dir.trim().is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => bus_defaults.local_log_dir.clone(),
        };

        let bus = BusConfig {
            enabled: env.flag("BUS_ENABLED", true)?,
            backend: env.parsed("BUS_BACKEND", BackendKind::Redis)?,
            broker_url: env.string("BUS_BROKER_URL", &bus_defaults.broker_url),
            consumer_group: env.string("BUS_CONSUMER_GROUP", &bus_defaults.consumer_group),
            client_id: env.string("BUS_CLIENT_ID", &bus_defaults.client_id),
            local_log_dir,
            publish_timeout: env.millis("BUS_PUBLISH_TIMEOUT_MS", bus_defaults.publish_timeout)?,
            retry,
            ..bus_defaults
        };

        Ok(Self {
            store,
            host: env.string("HOST", "0.0.0.0"),
            port: env.parsed("PORT", 3002)?,
            bus,
            health_check_interval: Duration::from_secs(env.parsed("HEALTH_CHECK_INTERVAL_SECS", 15)?),
            outbox_relay_interval: env.millis("OUTBOX_RELAY_INTERVAL_MS", Duration::from_secs(5))?,
            shutdown_grace: Duration::from_secs(env.parsed("SHUTDOWN_GRACE_SECS", 10)?),
            otlp_endpoint: env.get("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),
        })
    }

    /// Socket address the server binds to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid host.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn required(&self, key: &str) -> Result<String, AppError> {
        self.get(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, AppError> {
        match self.get(key) {
            Some(_) => Ok(Duration::from_millis(self.parsed(key, 0)?)),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, AppError> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "true" | "1" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "false" | "0" | "no" | "off") => Ok(false),
            Some(v) => Err(AppError::Config(format!("{key} is not a boolean: {v}"))),
        }
    }
}
