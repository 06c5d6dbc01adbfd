//! Backend capability contract.
//!
//! # Data Flow
//! ```text
//! Session start request
//!     → SourceFactory / SinkFactory (decorator chain, see security + instrumented)
//!     → backend factory opens a live connection
//!     → AsyncMessageSource::consume_messages / AsyncMessageSink::publish_messages
//!     → close()
//! ```
//!
//! # Design Decisions
//! - Backends know nothing about access control, metrics or health tracking
//! - Every pump takes a cancellation token; cancellation is a normal exit (`Ok`)
//! - The pump's return value is the only error channel back to the caller
//! - Factories never connect at construction time, only per session

pub mod mem;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

pub use mem::MemBackend;

/// A single message moving through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(with = "base64_data")]
    pub data: Vec<u8>,
}

impl Message {
    pub fn new(id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }
}

/// Snapshot reported by a connection's `status()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub working: bool,
    pub problems: Vec<String>,
}

impl Status {
    pub fn working() -> Self {
        Self {
            working: true,
            problems: Vec::new(),
        }
    }

    pub fn failing(problem: impl Into<String>) -> Self {
        Self {
            working: false,
            problems: vec![problem.into()],
        }
    }
}

/// Where a consumer group starts reading when it has no stored position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialOffset {
    Oldest,
    #[default]
    Newest,
}

/// Client identity presented when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub secret: String,
}

/// Parameters of a consume session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeRequest {
    pub topic: String,
    pub consumer: String,
    pub initial_offset: InitialOffset,
    pub credentials: Option<Credentials>,
}

/// Parameters of a publish session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishRequest {
    pub topic: String,
    pub credentials: Option<Credentials>,
}

/// Anything that can report its own health.
#[async_trait]
pub trait Statuser: Send + Sync {
    async fn status(&self) -> Result<Status>;
}

/// A live consuming connection.
#[async_trait]
pub trait AsyncMessageSource: Statuser {
    /// Deliver messages onto `messages` and take acknowledgements from `acks` until
    /// `cancel` fires, either channel closes, or the backend fails.
    async fn consume_messages(
        &self,
        cancel: CancellationToken,
        messages: mpsc::Sender<Message>,
        acks: mpsc::Receiver<Message>,
    ) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// A live publishing connection.
#[async_trait]
pub trait AsyncMessageSink: Statuser {
    /// Accept messages from `messages` and emit an acknowledgement onto `acks` for each
    /// one the backend has taken, until `cancel` fires, either channel closes, or the
    /// backend fails.
    async fn publish_messages(
        &self,
        cancel: CancellationToken,
        acks: mpsc::Sender<Message>,
        messages: mpsc::Receiver<Message>,
    ) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn new_source(
        &self,
        cancel: CancellationToken,
        req: ConsumeRequest,
    ) -> Result<Arc<dyn AsyncMessageSource>>;
}

#[async_trait]
pub trait SinkFactory: Send + Sync {
    async fn new_sink(
        &self,
        cancel: CancellationToken,
        req: PublishRequest,
    ) -> Result<Arc<dyn AsyncMessageSink>>;
}

mod base64_data {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
