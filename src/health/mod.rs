//! Health supervision subsystem.
//!
//! # Data Flow
//! ```text
//! Instrumented pump starts:
//!     → checker.rs (register id, status handle, eviction callback)
//!
//! Probe endpoint / monitor.rs tick:
//!     → checker.rs (dedup: join in-flight pass or start one)
//!     → status() on every tracked connection, each with its own timeout
//!     → failure counters updated, evictions fired
//!     → state.rs (Healthy / Degraded / Unhealthy)
//!
//! Instrumented pump ends:
//!     → checker.rs (deregister) → close backend connection
//! ```
//!
//! # Design Decisions
//! - One explicitly constructed checker per server, no global registry
//! - Eviction is cancellation of the connection's own token, never of siblings
//! - Health is observational: the process never exits because of it

pub mod checker;
pub mod monitor;
pub mod state;

pub use checker::{CheckResult, StatusChecker, StatusGuard};
pub use monitor::HealthMonitor;
pub use state::{CheckResponse, HealthState};
