//! HTTP surfaces.
//!
//! # Data Flow
//! ```text
//! session listener (default :6868)
//!     → server.rs (Axum router, /consume and /publish upgrades, credentials)
//!     → websocket.rs (JSON frames ⇄ ServerStream)
//!     → instrumented session server
//!
//! probe listener (default :8080)
//!     → probe.rs (/__/health, /__/ready, /__/metrics)
//! ```

pub mod probe;
pub mod server;
pub mod websocket;

pub use probe::{probe_router, ProbeState};
pub use server::{serve, session_router, AppState};
pub use websocket::WsStream;
