//! Tracked backend connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{AsyncMessageSink, AsyncMessageSource, Message, Status, Statuser};
use crate::error::{GatewayError, Result};
use crate::health::StatusChecker;
use crate::observability::metrics::PumpCounters;

/// Registry id for one connection: the identifying labels plus a random suffix.
pub(crate) fn connection_id(parts: &[&str]) -> String {
    let mut id = parts.join("-");
    id.push('-');
    id.push_str(&uuid::Uuid::new_v4().simple().to_string());
    id
}

struct SourceStatus(Arc<dyn AsyncMessageSource>);

#[async_trait]
impl Statuser for SourceStatus {
    async fn status(&self) -> Result<Status> {
        self.0.status().await
    }
}

struct SinkStatus(Arc<dyn AsyncMessageSink>);

#[async_trait]
impl Statuser for SinkStatus {
    async fn status(&self) -> Result<Status> {
        self.0.status().await
    }
}

/// Close bookkeeping shared by both directions.
struct Lifecycle {
    id: String,
    checker: StatusChecker,
    closed: AtomicBool,
}

impl Lifecycle {
    fn new(id: String, checker: StatusChecker) -> Self {
        Self {
            id,
            checker,
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns true only for the first caller.
    fn begin_close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.checker.remove_statuser(&self.id);
        true
    }
}

/// A consuming connection whose pump is health-tracked and counted.
pub struct InstrumentedSource {
    inner: Arc<dyn AsyncMessageSource>,
    lifecycle: Lifecycle,
    counters: PumpCounters,
}

impl InstrumentedSource {
    pub fn new(
        inner: Arc<dyn AsyncMessageSource>,
        checker: StatusChecker,
        topic: &str,
        consumer: &str,
    ) -> Self {
        Self {
            inner,
            lifecycle: Lifecycle::new(connection_id(&[topic, consumer]), checker),
            counters: PumpCounters::consume(topic, consumer),
        }
    }

    pub fn id(&self) -> &str {
        &self.lifecycle.id
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.inner.close().await
    }
}

#[async_trait]
impl Statuser for InstrumentedSource {
    async fn status(&self) -> Result<Status> {
        self.inner.status().await
    }
}

#[async_trait]
impl AsyncMessageSource for InstrumentedSource {
    async fn consume_messages(
        &self,
        cancel: CancellationToken,
        messages: mpsc::Sender<Message>,
        acks: mpsc::Receiver<Message>,
    ) -> Result<()> {
        if self.lifecycle.is_closed() {
            return Err(GatewayError::Closed);
        }

        let pump_cancel = cancel.child_token();
        let evict = pump_cancel.clone();
        let guard = self.lifecycle.checker.track(
            self.lifecycle.id.clone(),
            Arc::new(SourceStatus(self.inner.clone())),
            move || evict.cancel(),
        );

        tracing::debug!(id = %self.id(), "Consume pump started");
        let result = self
            .inner
            .consume_messages(pump_cancel, messages, acks)
            .await;

        drop(guard);
        if let Err(e) = self.shutdown().await {
            tracing::warn!(id = %self.id(), error = %e, "Closing backend source failed");
        }
        self.counters.record(&result);
        tracing::debug!(id = %self.id(), ok = result.is_ok(), "Consume pump finished");
        result
    }

    async fn close(&self) -> Result<()> {
        self.shutdown().await
    }
}

/// A publishing connection whose pump is health-tracked and counted.
pub struct InstrumentedSink {
    inner: Arc<dyn AsyncMessageSink>,
    lifecycle: Lifecycle,
    counters: PumpCounters,
}

impl InstrumentedSink {
    pub fn new(inner: Arc<dyn AsyncMessageSink>, checker: StatusChecker, topic: &str) -> Self {
        Self {
            inner,
            lifecycle: Lifecycle::new(connection_id(&[topic]), checker),
            counters: PumpCounters::publish(topic),
        }
    }

    pub fn id(&self) -> &str {
        &self.lifecycle.id
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        self.inner.close().await
    }
}

#[async_trait]
impl Statuser for InstrumentedSink {
    async fn status(&self) -> Result<Status> {
        self.inner.status().await
    }
}

#[async_trait]
impl AsyncMessageSink for InstrumentedSink {
    async fn publish_messages(
        &self,
        cancel: CancellationToken,
        acks: mpsc::Sender<Message>,
        messages: mpsc::Receiver<Message>,
    ) -> Result<()> {
        if self.lifecycle.is_closed() {
            return Err(GatewayError::Closed);
        }

        let pump_cancel = cancel.child_token();
        let evict = pump_cancel.clone();
        let guard = self.lifecycle.checker.track(
            self.lifecycle.id.clone(),
            Arc::new(SinkStatus(self.inner.clone())),
            move || evict.cancel(),
        );

        tracing::debug!(id = %self.id(), "Publish pump started");
        let result = self
            .inner
            .publish_messages(pump_cancel, acks, messages)
            .await;

        drop(guard);
        if let Err(e) = self.shutdown().await {
            tracing::warn!(id = %self.id(), error = %e, "Closing backend sink failed");
        }
        self.counters.record(&result);
        tracing::debug!(id = %self.id(), ok = result.is_ok(), "Publish pump finished");
        result
    }

    async fn close(&self) -> Result<()> {
        self.shutdown().await
    }
}
