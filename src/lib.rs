//! Pub/sub gateway library.
//!
//! Clients open WebSocket sessions to consume from or publish to topics on a message
//! backend. Every live backend connection is health-tracked while its pump runs;
//! connections that keep failing status probes are evicted.

pub mod backend;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod instrumented;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod session;

pub use config::schema::GatewayConfig;
pub use error::{GatewayError, Result};
pub use health::StatusChecker;
pub use lifecycle::{Gateway, Shutdown};
