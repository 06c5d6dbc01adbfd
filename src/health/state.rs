//! Aggregate health verdict.
//!
//! # States
//! - Healthy: every tracked connection works, or nothing is tracked
//! - Degraded: some connections fail or report problems, a majority still works
//! - Unhealthy: fewer than half of the tracked connections work
//!
//! # Design Decisions
//! - The checker only classifies; rendering belongs to the probe surface
//! - Remediation text travels with the verdict so any surface can show it

use serde::Serialize;

pub const FAILING_ACTION: &str = "Troubleshoot the gateway backend.";
pub const FAILING_IMPACT: &str = "Gateway not working.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "health", rename_all = "lowercase")]
pub enum HealthState {
    Healthy {
        output: String,
    },
    Degraded {
        output: String,
        action: String,
    },
    Unhealthy {
        output: String,
        action: String,
        impact: String,
    },
}

impl HealthState {
    pub fn healthy(output: impl Into<String>) -> Self {
        Self::Healthy {
            output: output.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy { .. })
    }

    pub fn output(&self) -> &str {
        match self {
            Self::Healthy { output }
            | Self::Degraded { output, .. }
            | Self::Unhealthy { output, .. } => output,
        }
    }

    /// Feed this verdict into a response sink.
    pub fn report(&self, resp: &mut dyn CheckResponse) {
        match self {
            Self::Healthy { output } => resp.healthy(output),
            Self::Degraded { output, action } => resp.degraded(output, action),
            Self::Unhealthy {
                output,
                action,
                impact,
            } => resp.unhealthy(output, action, impact),
        }
    }
}

/// Receiver of a named check's outcome.
pub trait CheckResponse {
    fn healthy(&mut self, output: &str);
    fn degraded(&mut self, output: &str, action: &str);
    fn unhealthy(&mut self, output: &str, action: &str, impact: &str);
}
