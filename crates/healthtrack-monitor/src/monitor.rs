//! Periodic health-check driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::checks::HealthCheck;
use crate::error::HealthError;
use crate::health::{HealthHandle, ServiceHealth};

/// Upper bound for a single probe.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

struct Registered {
    check: Arc<dyn HealthCheck>,
    handle: HealthHandle,
}

/// Owns one [`HealthHandle`] per check and writes each result through it.
pub struct HealthMonitor {
    checks: Vec<Registered>,
    check_timeout: Duration,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let services: Vec<_> = self.checks.iter().map(|r| r.handle.service()).collect();
        f.debug_struct("HealthMonitor")
            .field("services", &services)
            .field("check_timeout", &self.check_timeout)
            .finish()
    }
}

impl HealthMonitor {
    /// Registers every check's service on `health`.
    ///
    /// # Errors
    ///
    /// Returns the registry error when a service is already registered.
    pub fn new(
        health: &ServiceHealth,
        checks: Vec<Arc<dyn HealthCheck>>,
    ) -> Result<Self, HealthError> {
        let checks = checks
            .into_iter()
            .map(|check| {
                let handle = health.register(check.service())?;
                Ok(Registered { check, handle })
            })
            .collect::<Result<Vec<_>, HealthError>>()?;
        Ok(Self {
            checks,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_check_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    /// Runs every check once and records the results. Returns the number of
    /// services found down.
    pub async fn run_checks(&self) -> usize {
        let mut down = 0;
        for Registered { check, handle } in &self.checks {
            let result = match tokio::time::timeout(self.check_timeout, check.check()).await {
                Ok(result) => result,
                Err(_) => Err(HealthError::CheckFailed {
                    service: handle.service().to_owned(),
                    reason: format!("timed out after {:?}", self.check_timeout),
                }),
            };
            match result {
                Ok(()) => {
                    debug!(service = handle.service(), "health check passed");
                    handle.mark_up();
                }
                Err(e) => {
                    warn!(service = handle.service(), error = %e, "health check failed");
                    handle.mark_down();
                    down += 1;
                }
            }
        }
        down
    }

    /// Runs the checks every `interval` until `shutdown` flips to `true`.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(checks = self.checks.len(), ?interval, "health monitor started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_checks().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("health monitor stopped");
        })
    }
}
