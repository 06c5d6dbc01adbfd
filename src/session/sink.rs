//! Publish sessions.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{AsyncMessageSink, Credentials, Message, PublishRequest, SinkFactory};
use crate::error::{GatewayError, Result};
use crate::session::frame::{Confirmation, PublisherRequest, PublisherResponse};
use crate::session::stream::ServerStream;

/// Drives publish sessions against whatever factory chain it was built with.
pub struct SinkServer {
    factory: Arc<dyn SinkFactory>,
    shutdown: CancellationToken,
    channel_capacity: usize,
}

impl SinkServer {
    pub fn new(
        factory: Arc<dyn SinkFactory>,
        shutdown: CancellationToken,
        channel_capacity: usize,
    ) -> Self {
        Self {
            factory,
            shutdown,
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub async fn publish<S>(&self, stream: &mut S, credentials: Option<Credentials>) -> Result<()>
    where
        S: ServerStream<PublisherRequest, PublisherResponse> + ?Sized,
    {
        let start = match stream.recv().await? {
            Some(PublisherRequest::Start(start)) => start,
            Some(PublisherRequest::Messages(_)) => {
                return Err(GatewayError::protocol("first request must be a start request"))
            }
            None => return Ok(()),
        };

        let session = self.shutdown.child_token();
        let _cancel_on_exit = session.clone().drop_guard();

        tracing::debug!(topic = %start.topic, "Publish session starting");
        let sink = self
            .factory
            .new_sink(
                session.clone(),
                PublishRequest {
                    topic: start.topic,
                    credentials,
                },
            )
            .await?;

        let result = drive(sink.as_ref(), session.clone(), stream, self.channel_capacity).await;
        session.cancel();
        let closed = sink.close().await;
        result.and(closed)
    }
}

async fn drive<S>(
    sink: &dyn AsyncMessageSink,
    cancel: CancellationToken,
    stream: &mut S,
    capacity: usize,
) -> Result<()>
where
    S: ServerStream<PublisherRequest, PublisherResponse> + ?Sized,
{
    let (ack_tx, mut ack_rx) = mpsc::channel::<Message>(capacity);
    let (msg_tx, msg_rx) = mpsc::channel::<Message>(capacity);

    let pump = sink.publish_messages(cancel.clone(), ack_tx, msg_rx);
    tokio::pin!(pump);

    let outcome = 'session: loop {
        tokio::select! {
            result = &mut pump => return result,

            Some(ack) = ack_rx.recv() => {
                let confirm = PublisherResponse::Confirm(Confirmation { msg_id: ack.id });
                tokio::select! {
                    result = &mut pump => return result,
                    sent = stream.send(confirm) => {
                        if let Err(e) = sent {
                            break Err(e);
                        }
                    }
                }
            }

            request = stream.recv() => match request {
                Ok(Some(PublisherRequest::Messages(batch))) => {
                    for msg in batch {
                        tokio::select! {
                            result = &mut pump => return result,
                            sent = msg_tx.send(msg) => {
                                if sent.is_err() {
                                    break 'session Ok(());
                                }
                            }
                        }
                    }
                }
                Ok(Some(PublisherRequest::Start(_))) => {
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
