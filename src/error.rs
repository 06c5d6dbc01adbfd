//! Gateway error type.
//!
//! Every fallible operation on the session path returns [`GatewayError`]. Backends map
//! their native failures into [`GatewayError::Backend`]; decorators and session servers
//! add the variants they own.

use thiserror::Error;

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Rejected by access control before any backend was contacted.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Reported by the message broker implementation.
    #[error("backend error: {0}")]
    Backend(String),

    /// The client broke the session protocol (bad first frame, unknown ack, ...).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client stream failed underneath the session.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session was cancelled before its connection could be handed out.
    #[error("session cancelled")]
    Cancelled,

    /// The connection has already been closed.
    #[error("connection closed")]
    Closed,
}

impl GatewayError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed frame: {e}"))
    }
}
