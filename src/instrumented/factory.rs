//! Factory decorators that wrap every connection they hand out.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backend::{
    AsyncMessageSink, AsyncMessageSource, ConsumeRequest, PublishRequest, SinkFactory,
    SourceFactory,
};
use crate::error::{GatewayError, Result};
use crate::health::StatusChecker;
use crate::instrumented::connection::{InstrumentedSink, InstrumentedSource};

pub struct InstrumentedSourceFactory {
    pub checker: StatusChecker,
    pub next: Arc<dyn SourceFactory>,
}

#[async_trait]
impl SourceFactory for InstrumentedSourceFactory {
    async fn new_source(
        &self,
        cancel: CancellationToken,
        req: ConsumeRequest,
    ) -> Result<Arc<dyn AsyncMessageSource>> {
        let topic = req.topic.clone();
        let consumer = req.consumer.clone();
        let source = self.next.new_source(cancel.clone(), req).await?;

        // The session gave up while the backend was connecting.
        if cancel.is_cancelled() {
            if let Err(e) = source.close().await {
                tracing::warn!(topic = %topic, error = %e, "Closing abandoned source failed");
            }
            return Err(GatewayError::Cancelled);
        }

        Ok(Arc::new(InstrumentedSource::new(
            source,
            self.checker.clone(),
            &topic,
            &consumer,
        )))
    }
}

pub struct InstrumentedSinkFactory {
    pub checker: StatusChecker,
    pub next: Arc<dyn SinkFactory>,
}

#[async_trait]
impl SinkFactory for InstrumentedSinkFactory {
    async fn new_sink(
        &self,
        cancel: CancellationToken,
        req: PublishRequest,
    ) -> Result<Arc<dyn AsyncMessageSink>> {
        let topic = req.topic.clone();
        let sink = self.next.new_sink(cancel.clone(), req).await?;

        if cancel.is_cancelled() {
            if let Err(e) = sink.close().await {
                tracing::warn!(topic = %topic, error = %e, "Closing abandoned sink failed");
            }
            return Err(GatewayError::Cancelled);
        }

        Ok(Arc::new(InstrumentedSink::new(
            sink,
            self.checker.clone(),
            &topic,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemBackend, Message, Status, Statuser};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn factories(
        backend: &MemBackend,
    ) -> (
        InstrumentedSourceFactory,
        InstrumentedSinkFactory,
        StatusChecker,
    ) {
        let checker = StatusChecker::new(3, Duration::from_secs(1));
        (
            InstrumentedSourceFactory {
                checker: checker.clone(),
                next: Arc::new(backend.clone()),
            },
            InstrumentedSinkFactory {
                checker: checker.clone(),
                next: Arc::new(backend.clone()),
            },
            checker,
        )
    }

    #[tokio::test]
    async fn wrapping_alone_does_not_register() {
        let backend = MemBackend::new();
        let (sources, _, checker) = factories(&backend);
        let source = sources
            .new_source(
                CancellationToken::new(),
                ConsumeRequest {
                    topic: "orders".into(),
                    consumer: "group".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(checker.is_empty());
        source.close().await.unwrap();
    }

    /// Factory whose connections count `close()` calls.
    #[derive(Clone, Default)]
    struct CountingFactory {
        closes: Arc<AtomicUsize>,
    }

    struct CountingConn {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Statuser for CountingConn {
        async fn status(&self) -> Result<Status> {
            Ok(Status::working())
        }
    }

    #[async_trait]
    impl AsyncMessageSource for CountingConn {
        async fn consume_messages(
            &self,
            _cancel: CancellationToken,
            _messages: mpsc::Sender<Message>,
            _acks: mpsc::Receiver<Message>,
        ) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl AsyncMessageSink for CountingConn {
        async fn publish_messages(
            &self,
            _cancel: CancellationToken,
            _acks: mpsc::Sender<Message>,
            _messages: mpsc::Receiver<Message>,
        ) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl SourceFactory for CountingFactory {
        async fn new_source(
            &self,
            _cancel: CancellationToken,
            _req: ConsumeRequest,
        ) -> Result<Arc<dyn AsyncMessageSource>> {
            Ok(Arc::new(CountingConn {
                closes: self.closes.clone(),
            }))
        }
    }

    #[async_trait]
    impl SinkFactory for CountingFactory {
        async fn new_sink(
            &self,
            _cancel: CancellationToken,
            _req: PublishRequest,
        ) -> Result<Arc<dyn AsyncMessageSink>> {
            Ok(Arc::new(CountingConn {
                closes: self.closes.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn cancelled_session_closes_the_new_sink() {
        let backend = CountingFactory::default();
        let checker = StatusChecker::new(3, Duration::from_secs(1));
        let sinks = InstrumentedSinkFactory {
            checker: checker.clone(),
            next: Arc::new(backend.clone()),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sinks
            .new_sink(
                cancel,
                PublishRequest {
                    topic: "orders".into(),
                    credentials: None,
                },
            )
            .await;
        assert!(matches!(result, Err(GatewayError::Cancelled)));
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
        assert!(checker.is_empty());
    }

    #[tokio::test]
    async fn cancelled_session_closes_the_new_source() {
        let backend = CountingFactory::default();
        let checker = StatusChecker::new(3, Duration::from_secs(1));
        let sources = InstrumentedSourceFactory {
            checker: checker.clone(),
            next: Arc::new(backend.clone()),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sources
            .new_source(
                cancel,
                ConsumeRequest {
                    topic: "orders".into(),
                    consumer: "group".into(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(GatewayError::Cancelled)));
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
        assert!(checker.is_empty());
    }

    #[tokio::test]
    async fn live_session_connection_is_left_open() {
        let backend = CountingFactory::default();
        let sinks = InstrumentedSinkFactory {
            checker: StatusChecker::new(3, Duration::from_secs(1)),
            next: Arc::new(backend.clone()),
        };

        let sink = sinks
            .new_sink(
                CancellationToken::new(),
                PublishRequest {
                    topic: "orders".into(),
                    credentials: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(backend.closes.load(Ordering::SeqCst), 0);

        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backend_errors_pass_through_untracked() {
        let backend = MemBackend::new();
        backend.set_refuse_connections(true);
        let (_, sinks, checker) = factories(&backend);

        let result = sinks
            .new_sink(
                CancellationToken::new(),
                PublishRequest {
                    topic: "orders".into(),
                    credentials: None,
                },
            )
            .await;
        assert!(matches!(result, Err(GatewayError::Backend(_))));
        assert!(checker.is_empty());
    }

    #[tokio::test]
    async fn wrapped_sink_publishes_through() {
        let backend = MemBackend::new();
        let (_, sinks, checker) = factories(&backend);
        let sink = sinks
            .new_sink(
                CancellationToken::new(),
                PublishRequest {
                    topic: "orders".into(),
                    credentials: None,
                },
            )
            .await
            .unwrap();

        let (ack_tx, mut ack_rx) = mpsc::channel(4);
        let (msg_tx, msg_rx) = mpsc::channel(4);
        msg_tx.send(Message::new("1", b"x".to_vec())).await.unwrap();
        drop(msg_tx);
        sink.publish_messages(CancellationToken::new(), ack_tx, msg_rx)
            .await
            .unwrap();

        assert_eq!(ack_rx.recv().await.unwrap().id, "1");
        assert_eq!(backend.topic_len("orders"), 1);
        assert!(checker.is_empty());
    }
}
