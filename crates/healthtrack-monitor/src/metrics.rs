//! Prometheus metrics.
//!
//! One owned [`Registry`] per process, built in `main` and shared through
//! `Arc`. Series are cumulative for the process lifetime.

use std::time::Duration;

use healthtrack_core::Category;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::error::MetricsError;

/// Request-duration buckets, in seconds.
pub const HTTP_DURATION_BUCKETS: [f64; 9] = [0.1, 0.3, 0.5, 0.7, 1.0, 3.0, 5.0, 7.0, 10.0];

/// Service label for paths outside the known services.
pub const OTHER_SERVICE: &str = "other";

/// Service label for the dashboard routes.
pub const DASHBOARD_SERVICE: &str = "dashboard";

/// Health service name of the write store.
pub const WRITE_STORE_SERVICE: &str = "write_store";

/// Every metric the process exports.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    http_requests: IntCounterVec,
    http_duration: HistogramVec,
    service_health: IntGaugeVec,
    bus_publish: IntCounterVec,
    replication_events: IntCounterVec,
    outbox_relayed: IntCounterVec,
}

impl Metrics {
    /// Builds and registers every metric on a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Prometheus` when a metric cannot be registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "route", "status_code", "service"],
        )?;
        let http_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            )
            .buckets(HTTP_DURATION_BUCKETS.to_vec()),
            &["method", "route", "service"],
        )?;
        let service_health = IntGaugeVec::new(
            Opts::new("service_health_status", "Health status of services (1 = up, 0 = down)"),
            &["service"],
        )?;
        let bus_publish = IntCounterVec::new(
            Opts::new("bus_publish_total", "Envelopes published to the event bus"),
            &["topic", "outcome"],
        )?;
        let replication_events = IntCounterVec::new(
            Opts::new("replication_events_total", "Envelopes processed by the replication consumer"),
            &["topic", "outcome"],
        )?;
        let outbox_relayed = IntCounterVec::new(
            Opts::new("outbox_relayed_total", "Outbox entries forwarded by the relay"),
            &["outcome"],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;
        registry.register(Box::new(service_health.clone()))?;
        registry.register(Box::new(bus_publish.clone()))?;
        registry.register(Box::new(replication_events.clone()))?;
        registry.register(Box::new(outbox_relayed.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            http_duration,
            service_health,
            bus_publish,
            replication_events,
            outbox_relayed,
        })
    }

    /// Records one finished HTTP request.
    pub fn observe_http(&self, method: &str, route: &str, status: u16, elapsed: Duration) {
        let service = service_from_path(route);
        self.http_requests
            .with_label_values(&[method, route, &status.to_string(), service])
            .inc();
        self.http_duration
            .with_label_values(&[method, route, service])
            .observe(elapsed.as_secs_f64());
    }

    /// Sets a service gauge to 1 (up) or 0 (down).
    pub fn set_service_health(&self, service: &str, up: bool) {
        self.service_health
            .with_label_values(&[service])
            .set(i64::from(up));
    }

    /// Counts a publish attempt by outcome (`delivered`, `undelivered`).
    pub fn record_publish(&self, topic: Category, outcome: &str) {
        self.bus_publish
            .with_label_values(&[topic.topic(), outcome])
            .inc();
    }

    /// Counts a consumed envelope by outcome.
    pub fn record_replication(&self, topic: &str, outcome: &str) {
        self.replication_events
            .with_label_values(&[topic, outcome])
            .inc();
    }

    /// Counts a relayed outbox entry by outcome.
    pub fn record_relay(&self, outcome: &str) {
        self.outbox_relayed.with_label_values(&[outcome]).inc();
    }

    /// Current value of a replication counter.
    #[must_use]
    pub fn replication_count(&self, topic: &str, outcome: &str) -> u64 {
        self.replication_events
            .with_label_values(&[topic, outcome])
            .get()
    }

    /// Current value of a publish counter.
    #[must_use]
    pub fn publish_count(&self, topic: Category, outcome: &str) -> u64 {
        self.bus_publish
            .with_label_values(&[topic.topic(), outcome])
            .get()
    }

    /// Current value of a service gauge (0 for a service never set).
    #[must_use]
    pub fn service_health(&self, service: &str) -> i64 {
        self.service_health.with_label_values(&[service]).get()
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders every series in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError` when encoding fails.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Maps a request path to the logical service it belongs to.
#[must_use]
pub fn service_from_path(path: &str) -> &'static str {
    let Some(rest) = path.strip_prefix("/api/") else {
        return OTHER_SERVICE;
    };
    let segment = rest.split('/').next().unwrap_or_default();
    if segment == DASHBOARD_SERVICE {
        return DASHBOARD_SERVICE;
    }
    segment
        .parse::<Category>()
        .map_or(OTHER_SERVICE, Category::service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_from_path() {
        assert_eq!(service_from_path("/api/sleep"), "sleep");
        assert_eq!(service_from_path("/api/activity/{id}"), "activity");
        assert_eq!(service_from_path("/api/dashboard/summary"), "dashboard");
        assert_eq!(service_from_path("/api/unknown"), "other");
        assert_eq!(service_from_path("/health"), "other");
    }

    fn series_line<'a>(text: &'a str, name: &str, needle: &str) -> &'a str {
        text.lines()
            .find(|line| line.starts_with(name) && line.contains(needle))
            .unwrap_or_else(|| panic!("no {name} series containing {needle} in:\n{text}"))
    }

    #[test]
    fn test_encode_exposes_http_series_with_labels() {
        // Arrange
        let metrics = Metrics::new().unwrap();

        // Act
        metrics.observe_http("POST", "/api/sleep", 201, Duration::from_millis(120));
        let text = metrics.encode().unwrap();

        // Assert
        let requests = series_line(&text, "http_requests_total{", "status_code=\"201\"");
        assert!(requests.contains("method=\"POST\""));
        assert!(requests.contains("route=\"/api/sleep\""));
        assert!(requests.contains("service=\"sleep\""));
        assert!(requests.ends_with(" 1"));

        let fast = series_line(&text, "http_request_duration_seconds_bucket{", "le=\"0.1\"");
        let slower = series_line(&text, "http_request_duration_seconds_bucket{", "le=\"0.3\"");
        assert!(fast.ends_with(" 0"));
        assert!(slower.ends_with(" 1"));
    }

    #[test]
    fn test_service_gauge_round_trips() {
        let metrics = Metrics::new().unwrap();

        metrics.set_service_health("sleep", true);
        metrics.set_service_health("activity", false);

        assert_eq!(metrics.service_health("sleep"), 1);
        assert_eq!(metrics.service_health("activity"), 0);
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new().unwrap();

        metrics.record_publish(Category::Sleep, "delivered");
        metrics.record_publish(Category::Sleep, "delivered");
        metrics.record_replication("sleep-records", "inserted");

        assert_eq!(metrics.publish_count(Category::Sleep, "delivered"), 2);
        assert_eq!(metrics.replication_count("sleep-records", "inserted"), 1);
    }
}
