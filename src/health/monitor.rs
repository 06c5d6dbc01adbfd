//! Periodic self-check.
//!
//! # Responsibilities
//! - Drive the status checker on a timer so eviction happens without an external prober
//! - Log verdict transitions
//!
//! Passes triggered here and by the probe endpoint share the in-flight dedup, so the
//! two never double-probe a backend.

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::HealthCheckConfig;
use crate::health::checker::StatusChecker;
use crate::health::state::HealthState;

pub struct HealthMonitor {
    checker: StatusChecker,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(checker: StatusChecker, config: HealthCheckConfig) -> Self {
        Self { checker, config }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if !self.config.monitor_enabled {
            tracing::info!("Periodic health monitor disabled");
            return;
        }

        tracing::info!(
            interval = self.config.monitor_interval_secs,
            max_failed_checks = self.config.max_failed_checks,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.monitor_interval_secs));
        let mut last: Option<HealthState> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let state = self.checker.check_status().await;
                    if last.as_ref() != Some(&state) {
                        log_transition(&state);
                    }
                    last = Some(state);
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

fn log_transition(state: &HealthState) {
    match state {
        HealthState::Healthy { output } => tracing::info!(output = %output, "Backend healthy"),
        HealthState::Degraded { output, .. } => {
            tracing::warn!(output = %output, "Backend degraded")
        }
        HealthState::Unhealthy { output, .. } => {
            tracing::error!(output = %output, "Backend unhealthy")
        }
    }
}
