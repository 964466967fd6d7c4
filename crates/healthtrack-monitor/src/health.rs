//! Service health registry.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use healthtrack_core::clock::Clock;
use serde::Serialize;
use tracing::warn;

use crate::error::HealthError;
use crate::metrics::Metrics;

/// Liveness of one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// The service's last check succeeded.
    Up,
    /// The service's last check failed.
    Down,
}

impl HealthState {
    fn from_up(up: bool) -> Self {
        if up { Self::Up } else { Self::Down }
    }
}

/// Overall status reported on `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every registered service is up.
    Ok,
    /// At least one service is down.
    Degraded,
    /// The registry could not be read.
    Error,
}

/// Snapshot of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub services: BTreeMap<String, HealthState>,
    pub timestamp: DateTime<Utc>,
}

type States = Arc<RwLock<BTreeMap<String, HealthState>>>;

/// Registry of per-service gauges.
///
/// Cloning shares the registry. Entries are only writable through the
/// [`HealthHandle`] returned by [`ServiceHealth::register`].
#[derive(Clone)]
pub struct ServiceHealth {
    states: States,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServiceHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHealth")
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}

impl ServiceHealth {
    /// Creates an empty registry. Gauges are mirrored into `metrics` when given.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            states: Arc::new(RwLock::new(BTreeMap::new())),
            clock,
            metrics,
        }
    }

    /// Registers `service`, starting it `up`.
    ///
    /// # Errors
    ///
    /// Returns `HealthError::AlreadyRegistered` for a duplicate name and
    /// `HealthError::Poisoned` when the registry lock is poisoned.
    pub fn register(&self, service: &str) -> Result<HealthHandle, HealthError> {
        {
            let mut states = self.states.write().map_err(|_| HealthError::Poisoned)?;
            if states.contains_key(service) {
                return Err(HealthError::AlreadyRegistered(service.to_owned()));
            }
            states.insert(service.to_owned(), HealthState::Up);
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_service_health(service, true);
        }
        Ok(HealthHandle {
            service: service.to_owned(),
            states: Arc::clone(&self.states),
            metrics: self.metrics.clone(),
        })
    }

    /// Current state of one service, if registered and readable.
    #[must_use]
    pub fn state(&self, service: &str) -> Option<HealthState> {
        self.states.read().ok()?.get(service).copied()
    }

    /// Builds the report served on `/health`.
    #[must_use]
    pub fn report(&self) -> HealthReport {
        let timestamp = self.clock.now();
        let Ok(states) = self.states.read() else {
            return HealthReport {
                status: HealthStatus::Error,
                services: BTreeMap::new(),
                timestamp,
            };
        };
        let status = if states.values().all(|state| *state == HealthState::Up) {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            services: states.clone(),
            timestamp,
        }
    }
}

/// Write access to exactly one service's gauge.
#[derive(Debug)]
pub struct HealthHandle {
    service: String,
    states: States,
    metrics: Option<Arc<Metrics>>,
}

impl HealthHandle {
    /// Name of the service this handle writes.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn set(&self, up: bool) {
        match self.states.write() {
            Ok(mut states) => {
                let state = HealthState::from_up(up);
                if states.insert(self.service.clone(), state) != Some(state) {
                    warn!(service = %self.service, ?state, "service health changed");
                }
            }
            Err(_) => warn!(service = %self.service, "health registry poisoned"),
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_service_health(&self.service, up);
        }
    }

    pub fn mark_up(&self) {
        self.set(true);
    }

    pub fn mark_down(&self) {
        self.set(false);
    }
}

#[cfg(test)]
mod tests {
    use healthtrack_test_support::FixedClock;

    use super::*;

    fn registry(metrics: Option<Arc<Metrics>>) -> ServiceHealth {
        ServiceHealth::new(Arc::new(FixedClock::morning()), metrics)
    }

    #[test]
    fn test_registered_services_start_up_and_report_ok() {
        // Arrange
        let health = registry(None);
        let _sleep = health.register("sleep").unwrap();
        let _activity = health.register("activity").unwrap();

        // Act
        let report = health.report();

        // Assert
        assert_eq!(report.status, HealthStatus::Ok);
        assert_eq!(report.services.len(), 2);
        assert_eq!(report.services["sleep"], HealthState::Up);
        assert_eq!(report.timestamp, FixedClock::morning().0);
    }

    #[test]
    fn test_any_down_service_degrades_report() {
        // Arrange
        let health = registry(None);
        let sleep = health.register("sleep").unwrap();
        let _activity = health.register("activity").unwrap();

        // Act
        sleep.mark_down();
        let degraded = health.report();
        sleep.mark_up();
        let recovered = health.report();

        // Assert
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert_eq!(degraded.services["sleep"], HealthState::Down);
        assert_eq!(degraded.services["activity"], HealthState::Up);
        assert_eq!(recovered.status, HealthStatus::Ok);
    }

    #[test]
    fn test_handle_only_writes_its_own_service() {
        let health = registry(None);
        let sleep = health.register("sleep").unwrap();
        let _nutrition = health.register("nutrition").unwrap();

        sleep.mark_down();

        assert_eq!(sleep.service(), "sleep");
        assert_eq!(health.state("sleep"), Some(HealthState::Down));
        assert_eq!(health.state("nutrition"), Some(HealthState::Up));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let health = registry(None);
        let _first = health.register("sleep").unwrap();

        let err = health.register("sleep").unwrap_err();

        assert!(matches!(err, HealthError::AlreadyRegistered(name) if name == "sleep"));
    }

    #[test]
    fn test_gauges_are_mirrored_into_metrics() {
        // Arrange
        let metrics = Arc::new(Metrics::new().unwrap());
        let health = registry(Some(Arc::clone(&metrics)));

        // Act
        let wellbeing = health.register("wellbeing").unwrap();
        let registered = metrics.service_health("wellbeing");
        wellbeing.mark_down();

        // Assert
        assert_eq!(registered, 1);
        assert_eq!(metrics.service_health("wellbeing"), 0);
    }

    #[test]
    fn test_poisoned_registry_reports_error() {
        // Arrange
        let health = registry(None);
        let _sleep = health.register("sleep").unwrap();
        let states = Arc::clone(&health.states);
        let _ = std::thread::spawn(move || {
            let _guard = states.write().unwrap();
            panic!("writer panicked while holding the lock");
        })
        .join();

        // Act
        let report = health.report();

        // Assert
        assert_eq!(report.status, HealthStatus::Error);
        assert!(report.services.is_empty());
        assert!(matches!(
            health.register("activity"),
            Err(HealthError::Poisoned)
        ));
    }

    #[test]
    fn test_report_serializes_lowercase_states() {
        let health = registry(None);
        let sleep = health.register("sleep").unwrap();
        sleep.mark_down();

        let json = serde_json::to_value(health.report()).unwrap();

        assert_eq!(json["status"], "degraded");
        assert_eq!(json["services"]["sleep"], "down");
        assert_eq!(json["timestamp"], "2024-01-02T06:05:00Z");
    }
}
