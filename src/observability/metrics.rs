//! Metrics collection and exposition.
//!
//! # Metrics
//! - `consume_pumps_total` (counter): consume pump runs by outcome, topic, consumer
//! - `publish_pumps_total` (counter): publish pump runs by outcome, topic
//! - `errors_total` (counter): sessions that ended in an error
//! - `gateway_connections_evicted_total` (counter): connections cancelled by health checks
//! - `gateway_tracked_connections` (gauge): connections currently under health checks
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; exposition is Prometheus text
//! - Per-session counters are resolved once when the connection is wrapped, so the
//!   pump's exit path is a single atomic increment

use metrics::{counter, describe_counter, describe_gauge, gauge, Counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::error::Result;

pub const CONSUME_PUMPS_TOTAL: &str = "consume_pumps_total";
pub const PUBLISH_PUMPS_TOTAL: &str = "publish_pumps_total";
pub const ERRORS_TOTAL: &str = "errors_total";
pub const EVICTIONS_TOTAL: &str = "gateway_connections_evicted_total";
pub const TRACKED_CONNECTIONS: &str = "gateway_tracked_connections";

/// Install the global Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

pub fn describe_metrics() {
    describe_counter!(CONSUME_PUMPS_TOTAL, "Consume pump runs by terminal outcome");
    describe_counter!(PUBLISH_PUMPS_TOTAL, "Publish pump runs by terminal outcome");
    describe_counter!(ERRORS_TOTAL, "A counter of the number of errors");
    describe_counter!(EVICTIONS_TOTAL, "Backend connections evicted after failed checks");
    describe_gauge!(TRACKED_CONNECTIONS, "Backend connections under health checks");
}

/// Outcome counters for one pump.
#[derive(Clone)]
pub struct PumpCounters {
    success: Counter,
    error: Counter,
}

impl PumpCounters {
    pub fn consume(topic: &str, consumer: &str) -> Self {
        let labels = |outcome: &'static str| {
            counter!(
                CONSUME_PUMPS_TOTAL,
                "outcome" => outcome,
                "topic" => topic.to_string(),
                "consumer" => consumer.to_string()
            )
        };
        Self {
            success: labels("success"),
            error: labels("error"),
        }
    }

    pub fn publish(topic: &str) -> Self {
        let labels = |outcome: &'static str| {
            counter!(
                PUBLISH_PUMPS_TOTAL,
                "outcome" => outcome,
                "topic" => topic.to_string()
            )
        };
        Self {
            success: labels("success"),
            error: labels("error"),
        }
    }

    pub fn record<T>(&self, result: &Result<T>) {
        match result {
            Ok(_) => self.success.increment(1),
            Err(_) => self.error.increment(1),
        }
    }
}

pub fn errors_counter() -> Counter {
    counter!(ERRORS_TOTAL)
}

pub fn record_eviction() {
    counter!(EVICTIONS_TOTAL).increment(1);
}

pub fn set_tracked_connections(count: usize) {
    gauge!(TRACKED_CONNECTIONS).set(count as f64);
}

/// Find the value of the sample of `name` carrying every label in `labels` in
/// Prometheus text output.
#[cfg(test)]
pub(crate) fn sample_value(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .find(|line| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!("{k}=\"{v}\"")))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}
