//! Transport-neutral client stream.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{GatewayError, Result};

/// One client's bidirectional stream as seen by the gateway.
///
/// `recv` must be cancel-safe: sessions race it against their pump.
#[async_trait]
pub trait ServerStream<In, Out>: Send
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Next request, or `None` once the client has finished.
    async fn recv(&mut self) -> Result<Option<In>>;

    async fn send(&mut self, item: Out) -> Result<()>;
}

/// In-process stream backed by a pair of channels.
pub struct ChannelStream<In, Out> {
    incoming: mpsc::Receiver<In>,
    outgoing: mpsc::Sender<Out>,
}

/// The client half of a [`ChannelStream`].
pub struct ChannelClient<In, Out> {
    pub requests: mpsc::Sender<In>,
    pub responses: mpsc::Receiver<Out>,
}

pub fn channel_stream<In, Out>(capacity: usize) -> (ChannelStream<In, Out>, ChannelClient<In, Out>) {
    let (req_tx, req_rx) = mpsc::channel(capacity);
    let (resp_tx, resp_rx) = mpsc::channel(capacity);
    (
        ChannelStream {
            incoming: req_rx,
            outgoing: resp_tx,
        },
        ChannelClient {
            requests: req_tx,
            responses: resp_rx,
        },
    )
}

#[async_trait]
impl<In, Out> ServerStream<In, Out> for ChannelStream<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<In>> {
        Ok(self.incoming.recv().await)
    }

    async fn send(&mut self, item: Out) -> Result<()> {
        self.outgoing
            .send(item)
            .await
            .map_err(|_| GatewayError::Transport("client went away".into()))
    }
}
