//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, addresses parse)
//! - Detect duplicate endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, addr) in [
        ("listener.bind_address", &config.listener.bind_address),
        ("probe.bind_address", &config.probe.bind_address),
    ] {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(field, format!("invalid address {addr:?}")));
        }
    }

    if config.health.max_failed_checks == 0 {
        errors.push(ValidationError::new(
            "health.max_failed_checks",
            "must be a positive integer",
        ));
    }
    if config.health.probe_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "health.probe_timeout_secs",
            "must be greater than zero",
        ));
    }
    if config.health.monitor_enabled && config.health.monitor_interval_secs == 0 {
        errors.push(ValidationError::new(
            "health.monitor_interval_secs",
            "must be greater than zero when the monitor is enabled",
        ));
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if !seen.insert(endpoint) {
            errors.push(ValidationError::new(
                "endpoints",
                format!("{} listed twice", endpoint.as_str()),
            ));
        }
    }

    if config.session.channel_capacity == 0 {
        errors.push(ValidationError::new(
            "session.channel_capacity",
            "must be greater than zero",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
