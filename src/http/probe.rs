//! Operational endpoints.
//!
//! - `GET /__/health`: JSON report of every named check (currently `backend`)
//! - `GET /__/ready`: 200 unless a check is unhealthy, then 503
//! - `GET /__/metrics`: Prometheus text, when a recorder is installed
//!
//! Each request to the health or ready endpoint runs (or joins) one status pass, which
//! is what drives failure counting and eviction when no monitor is configured.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::health::{CheckResponse, HealthState, StatusChecker};

pub const HEALTH_PATH: &str = "/__/health";
pub const READY_PATH: &str = "/__/ready";
pub const METRICS_PATH: &str = "/__/metrics";

#[derive(Clone)]
pub struct ProbeState {
    pub checker: StatusChecker,
    pub metrics: Option<PrometheusHandle>,
}

/// One named check as rendered on the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub health: &'static str,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
}

impl CheckReport {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            health: "healthy",
            output: String::new(),
            action: None,
            impact: None,
        }
    }
}

impl CheckResponse for CheckReport {
    fn healthy(&mut self, output: &str) {
        self.health = "healthy";
        self.output = output.to_string();
    }

    fn degraded(&mut self, output: &str, action: &str) {
        self.health = "degraded";
        self.output = output.to_string();
        self.action = Some(action.to_string());
    }

    fn unhealthy(&mut self, output: &str, action: &str, impact: &str) {
        self.health = "unhealthy";
        self.output = output.to_string();
        self.action = Some(action.to_string());
        self.impact = Some(impact.to_string());
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub name: &'static str,
    pub version: &'static str,
    pub health: &'static str,
    pub checks: Vec<CheckReport>,
}

pub fn probe_router(state: ProbeState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .route(READY_PATH, get(ready_handler))
        .route(METRICS_PATH, get(metrics_handler))
        .with_state(state)
}

async fn backend_check(checker: &StatusChecker) -> (HealthState, CheckReport) {
    let state = checker.check_status().await;
    let mut report = CheckReport::named("backend");
    state.report(&mut report);
    (state, report)
}

async fn health_handler(State(state): State<ProbeState>) -> impl IntoResponse {
    let (_, backend) = backend_check(&state.checker).await;
    Json(HealthReport {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        health: backend.health,
        checks: vec![backend],
    })
}

async fn ready_handler(State(state): State<ProbeState>) -> impl IntoResponse {
    let (verdict, report) = backend_check(&state.checker).await;
    if verdict.is_unhealthy() {
        (StatusCode::SERVICE_UNAVAILABLE, report.output)
    } else {
        (StatusCode::OK, "ready".to_string())
    }
}

async fn metrics_handler(State(state): State<ProbeState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
