//! Client sessions.
//!
//! # Data Flow
//! ```text
//! client stream (WebSocket or in-process channel)
//!     → first frame: start {topic, ...}
//!     → factory chain opens a backend connection under a per-session token
//!     → pump runs; frames are relayed both ways
//!     → client ends / pump ends / shutdown → token cancelled → close()
//! ```
//!
//! # Design Decisions
//! - Each session's token is a child of the gateway shutdown token
//! - Sessions never buffer more than `channel_capacity` messages per direction
//! - A confirmation for a message the client was never sent ends the session

pub mod frame;
pub mod sink;
pub mod source;
pub mod stream;

pub use frame::{
    Confirmation, ConsumerRequest, ConsumerResponse, PublisherRequest, PublisherResponse,
    StartConsume, StartPublish,
};
pub use sink::SinkServer;
pub use source::SourceServer;
pub use stream::{channel_stream, ChannelClient, ChannelStream, ServerStream};
