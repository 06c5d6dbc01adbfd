//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Client-facing listener.
    pub listener: ListenerConfig,

    /// Operational (health, readiness, metrics) listener.
    pub probe: ProbeConfig,

    /// Backend connection health supervision.
    pub health: HealthCheckConfig,

    /// Session endpoints to expose.
    pub endpoints: Vec<Endpoint>,

    /// Message broker implementation.
    pub backend: BackendConfig,

    /// Optional access control list file.
    pub acl_config: Option<PathBuf>,

    /// Per-session channel settings.
    pub session: SessionConfig,

    /// Log session errors and raise the default log level.
    pub debug: bool,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:6868").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:6868".to_string(),
        }
    }
}

/// Operational server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Bind address for `/__/health`, `/__/ready` and `/__/metrics`.
    pub bind_address: String,

    /// Install the Prometheus recorder and serve `/__/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            metrics_enabled: true,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Consecutive failed checks before a connection is evicted.
    pub max_failed_checks: u32,

    /// Upper bound for a single connection's status call, in seconds.
    pub probe_timeout_secs: u64,

    /// Run checks on a timer in addition to external probes.
    pub monitor_enabled: bool,

    /// Interval between timer-driven checks, in seconds.
    pub monitor_interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            max_failed_checks: 3,
            probe_timeout_secs: 5,
            monitor_enabled: false,
            monitor_interval_secs: 10,
        }
    }
}

/// A session endpoint clients can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Consume,
    Publish,
}

impl Endpoint {
    pub fn all() -> Vec<Endpoint> {
        vec![Endpoint::Consume, Endpoint::Publish]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Consume => "consume",
            Endpoint::Publish => "publish",
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "consume" => Ok(Endpoint::Consume),
            "publish" => Ok(Endpoint::Publish),
            other => Err(format!("invalid endpoint: {other}")),
        }
    }
}

/// Backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-memory testing backend.
    #[default]
    Mem,
}

/// Per-session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the message and acknowledgement channels of one session.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Endpoints to serve; an unset list means all of them.
    pub fn enabled_endpoints(&self) -> Vec<Endpoint> {
        if self.endpoints.is_empty() {
            Endpoint::all()
        } else {
            self.endpoints.clone()
        }
    }

    pub fn endpoint_enabled(&self, endpoint: Endpoint) -> bool {
        self.enabled_endpoints().contains(&endpoint)
    }
}
