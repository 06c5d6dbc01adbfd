//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Session start request (topic, consumer, credentials)
//!     → access_control.rs (outermost factory decorator)
//!     → denied: error to the client, backend never contacted
//!     → allowed: next factory (instrumentation, then backend)
//! ```
//!
//! # Design Decisions
//! - Fail closed: unknown credentials are rejected, not downgraded to anonymous
//! - Access control sits outside instrumentation so rejected requests are never tracked

pub mod access_control;

pub use access_control::{AclConfig, AclSinkFactory, AclSourceFactory};
