//! Session frames exchanged with clients.
//!
//! ```text
//! consume:  client → {"start":{"topic":"t","consumer":"c","initial_offset":"oldest"}}
//!           server → {"message":{"id":"1","data":"<base64>"}}
//!           client → {"confirm":{"msg_id":"1"}}
//! publish:  client → {"start":{"topic":"t"}}
//!           client → {"messages":[{"id":"1","data":"<base64>"}]}
//!           server → {"confirm":{"msg_id":"1"}}
//! ```

use serde::{Deserialize, Serialize};

use crate::backend::{InitialOffset, Message};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartConsume {
    pub topic: String,
    pub consumer: String,
    #[serde(default)]
    pub initial_offset: InitialOffset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPublish {
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub msg_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerRequest {
    Start(StartConsume),
    Confirm(Confirmation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerResponse {
    Message(Message),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherRequest {
    Start(StartPublish),
    Messages(Vec<Message>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherResponse {
    Confirm(Confirmation),
}
