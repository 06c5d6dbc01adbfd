//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → /__/metrics on the operational server (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Connection ids flow through every log line about a session
//! - Metrics are cheap (atomic increments, handles resolved up front)

pub mod logging;
pub mod metrics;
