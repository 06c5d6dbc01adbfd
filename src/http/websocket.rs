//! WebSocket transport for sessions.
//!
//! # Responsibilities
//! - Adapt an upgraded socket to [`ServerStream`] with JSON text frames
//! - Close the socket with a status code and the error text when a session fails
//!
//! # Design Decisions
//! - Binary frames are accepted and parsed as JSON too; replies are always text
//! - Ping/pong is left to the socket; `recv` skips control frames
//! - A client close frame reads as end of stream, never as an error

use std::marker::PhantomData;

use async_trait::async_trait;
use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{GatewayError, Result};
use crate::session::ServerStream;

/// Close reasons are limited to 123 bytes by the protocol.
const MAX_CLOSE_REASON: usize = 123;

pub struct WsStream<In, Out> {
    socket: WebSocket,
    _frames: PhantomData<fn() -> (In, Out)>,
}

impl<In, Out> WsStream<In, Out> {
    pub fn new(socket: WebSocket) -> Self {
        Self {
            socket,
            _frames: PhantomData,
        }
    }

    /// Send the closing handshake reflecting how the session ended.
    pub async fn finish(mut self, result: &Result<()>) {
        let frame = match result {
            Ok(()) => CloseFrame {
                code: close_code::NORMAL,
                reason: Utf8Bytes::from_static(""),
            },
            Err(e) => CloseFrame {
                code: close_code_for(e),
                reason: truncate(&e.to_string(), MAX_CLOSE_REASON).into(),
            },
        };
        if let Err(e) = self.socket.send(WsMessage::Close(Some(frame))).await {
            tracing::debug!(error = %e, "Client gone before close frame");
        }
    }
}

fn close_code_for(err: &GatewayError) -> u16 {
    match err {
        GatewayError::AccessDenied(_) => close_code::POLICY,
        GatewayError::Protocol(_) => close_code::PROTOCOL,
        GatewayError::Cancelled | GatewayError::Closed => close_code::AWAY,
        GatewayError::Backend(_) | GatewayError::Transport(_) => close_code::ERROR,
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[async_trait]
impl<In, Out> ServerStream<In, Out> for WsStream<In, Out>
where
    In: DeserializeOwned + Send + 'static,
    Out: Serialize + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<In>> {
        loop {
            let frame = match self.socket.recv().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(GatewayError::Transport(e.to_string())),
                Some(Ok(frame)) => frame,
            };
            match frame {
                WsMessage::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
                WsMessage::Binary(bytes) => return Ok(Some(serde_json::from_slice(&bytes)?)),
                WsMessage::Close(_) => return Ok(None),
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            }
        }
    }

    async fn send(&mut self, item: Out) -> Result<()> {
        let text = serde_json::to_string(&item)?;
        self.socket
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "é".repeat(100);
        let cut = truncate(&text, MAX_CLOSE_REASON);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert_eq!(cut.len() % 2, 0);
        assert_eq!(truncate("short", MAX_CLOSE_REASON), "short");
    }

    #[test]
    fn access_denied_closes_with_policy_code() {
        assert_eq!(
            close_code_for(&GatewayError::AccessDenied("no".into())),
            close_code::POLICY
        );
        assert_eq!(
            close_code_for(&GatewayError::backend("down")),
            close_code::ERROR
        );
    }
}
