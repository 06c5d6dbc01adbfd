//! Consume sessions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{AsyncMessageSource, ConsumeRequest, Credentials, Message, SourceFactory};
use crate::error::{GatewayError, Result};
use crate::session::frame::{ConsumerRequest, ConsumerResponse};
use crate::session::stream::ServerStream;

/// Drives consume sessions against whatever factory chain it was built with.
pub struct SourceServer {
    factory: Arc<dyn SourceFactory>,
    shutdown: CancellationToken,
    channel_capacity: usize,
}

impl SourceServer {
    pub fn new(
        factory: Arc<dyn SourceFactory>,
        shutdown: CancellationToken,
        channel_capacity: usize,
    ) -> Self {
        Self {
            factory,
            shutdown,
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Serve one client until it finishes, the backend connection ends, or the
    /// gateway shuts down.
    pub async fn consume<S>(&self, stream: &mut S, credentials: Option<Credentials>) -> Result<()>
    where
        S: ServerStream<ConsumerRequest, ConsumerResponse> + ?Sized,
    {
        let start = match stream.recv().await? {
            Some(ConsumerRequest::Start(start)) => start,
            Some(ConsumerRequest::Confirm(_)) => {
                return Err(GatewayError::protocol("first request must be a start request"))
            }
            None => return Ok(()),
        };

        let session = self.shutdown.child_token();
        let _cancel_on_exit = session.clone().drop_guard();

        tracing::debug!(topic = %start.topic, consumer = %start.consumer, "Consume session starting");
        let source = self
            .factory
            .new_source(
                session.clone(),
                ConsumeRequest {
                    topic: start.topic,
                    consumer: start.consumer,
                    initial_offset: start.initial_offset,
                    credentials,
                },
            )
            .await?;

        let result = drive(source.as_ref(), session.clone(), stream, self.channel_capacity).await;
        session.cancel();
        let closed = source.close().await;
        result.and(closed)
    }
}

async fn drive<S>(
    source: &dyn AsyncMessageSource,
    cancel: CancellationToken,
    stream: &mut S,
    capacity: usize,
) -> Result<()>
where
    S: ServerStream<ConsumerRequest, ConsumerResponse> + ?Sized,
{
    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(capacity);
    let (ack_tx, ack_rx) = mpsc::channel::<Message>(capacity);

    let pump = source.consume_messages(cancel.clone(), msg_tx, ack_rx);
    tokio::pin!(pump);

    // Delivered to the client, not yet confirmed.
    let mut unconfirmed: HashMap<String, Message> = HashMap::new();

    let outcome = loop {
        tokio::select! {
            result = &mut pump => return result,

            Some(msg) = msg_rx.recv() => {
                unconfirmed.insert(msg.id.clone(), msg.clone());
                tokio::select! {
                    result = &mut pump => return result,
                    sent = stream.send(ConsumerResponse::Message(msg)) => {
                        if let Err(e) = sent {
                            break Err(e);
                        }
                    }
                }
            }

            request = stream.recv() => match request {
                Ok(Some(ConsumerRequest::Confirm(confirm))) => {
                    let Some(msg) = unconfirmed.remove(&confirm.msg_id) else {
                        break Err(GatewayError::Protocol(format!(
                            "confirmation for unknown message {:?}",
                            confirm.msg_id
                        )));
                    };
                    tokio::select! {
                        result = &mut pump => return result,
                        sent = ack_tx.send(msg) => {
                            if sent.is_err() {
                                break Ok(());
                            }
                        }
                    }
                }
                Ok(Some(ConsumerRequest::Start(_))) => {
                    break Err(GatewayError::protocol("session already started"));
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            },
        }
    };

    cancel.cancel();
    let pumped = pump.await;
    outcome.and(pumped)
}
