//! In-memory testing backend.
//!
//! Topics are append-only logs shared by every connection of one [`MemBackend`].
//! Consumer groups share a cursor, so two sessions in the same group split the
//! traffic while two groups each see every message. Delivery advances the cursor;
//! acknowledgements are accepted and dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::backend::{
    AsyncMessageSink, AsyncMessageSource, ConsumeRequest, InitialOffset, Message, PublishRequest,
    SinkFactory, SourceFactory, Status, Statuser,
};
use crate::error::{GatewayError, Result};

#[derive(Default)]
struct Topic {
    log: Vec<Message>,
    cursors: HashMap<String, usize>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct Shared {
    topics: Mutex<HashMap<String, Topic>>,
    status_fault: Mutex<Option<String>>,
    refuse_connections: AtomicBool,
}

impl Shared {
    fn topics(&self) -> std::sync::MutexGuard<'_, HashMap<String, Topic>> {
        self.topics.lock().expect("mem backend topics mutex poisoned")
    }

    fn join_group(&self, topic: &str, consumer: &str, offset: InitialOffset) {
        let mut topics = self.topics();
        let topic = topics.entry(topic.to_string()).or_default();
        let start = match offset {
            InitialOffset::Oldest => 0,
            InitialOffset::Newest => topic.log.len(),
        };
        topic.cursors.entry(consumer.to_string()).or_insert(start);
    }

    fn notify_for(&self, topic: &str) -> Arc<Notify> {
        self.topics().entry(topic.to_string()).or_default().notify.clone()
    }

    fn next_message(&self, topic: &str, consumer: &str) -> Option<Message> {
        let mut topics = self.topics();
        let topic = topics.get_mut(topic)?;
        let cursor = topic.cursors.entry(consumer.to_string()).or_insert(0);
        let msg = topic.log.get(*cursor).cloned()?;
        *cursor += 1;
        Some(msg)
    }

    fn append(&self, topic: &str, msg: Message) {
        let notify = {
            let mut topics = self.topics();
            let topic = topics.entry(topic.to_string()).or_default();
            topic.log.push(msg);
            topic.notify.clone()
        };
        notify.notify_waiters();
    }

    fn status(&self) -> Status {
        match self
            .status_fault
            .lock()
            .expect("mem backend fault mutex poisoned")
            .as_ref()
        {
            Some(problem) => Status::failing(problem.clone()),
            None => Status::working(),
        }
    }
}

/// In-memory broker. Cloning shares the same topics.
#[derive(Clone, Default)]
pub struct MemBackend {
    shared: Arc<Shared>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connection report not-working with `problem`, or clear the fault.
    pub fn set_status_fault(&self, problem: Option<&str>) {
        *self
            .shared
            .status_fault
            .lock()
            .expect("mem backend fault mutex poisoned") = problem.map(str::to_string);
    }

    /// Make new connections fail to open.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.shared.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Number of messages stored on `topic`.
    pub fn topic_len(&self, topic: &str) -> usize {
        self.shared.topics().get(topic).map_or(0, |t| t.log.len())
    }

    fn check_accepting(&self) -> Result<()> {
        if self.shared.refuse_connections.load(Ordering::SeqCst) {
            return Err(GatewayError::backend("mem backend refusing connections"));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceFactory for MemBackend {
    async fn new_source(
        &self,
        _cancel: CancellationToken,
        req: ConsumeRequest,
    ) -> Result<Arc<dyn AsyncMessageSource>> {
        self.check_accepting()?;
        self.shared
            .join_group(&req.topic, &req.consumer, req.initial_offset);
        Ok(Arc::new(MemSource {
            shared: self.shared.clone(),
            topic: req.topic,
            consumer: req.consumer,
            closed: AtomicBool::new(false),
        }))
    }
}

#[async_trait]
impl SinkFactory for MemBackend {
    async fn new_sink(
        &self,
        _cancel: CancellationToken,
        req: PublishRequest,
    ) -> Result<Arc<dyn AsyncMessageSink>> {
        self.check_accepting()?;
        Ok(Arc::new(MemSink {
            shared: self.shared.clone(),
            topic: req.topic,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemSource {
    shared: Arc<Shared>,
    topic: String,
    consumer: String,
    closed: AtomicBool,
}

#[async_trait]
impl Statuser for MemSource {
    async fn status(&self) -> Result<Status> {
        Ok(self.shared.status())
    }
}

#[async_trait]
impl AsyncMessageSource for MemSource {
    async fn consume_messages(
        &self,
        cancel: CancellationToken,
        messages: mpsc::Sender<Message>,
        mut acks: mpsc::Receiver<Message>,
    ) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Closed);
        }
        let notify = self.shared.notify_for(&self.topic);

        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(msg) = self.shared.next_message(&self.topic, &self.consumer) {
                let send = messages.send(msg);
                tokio::pin!(send);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(()),
                        sent = &mut send => {
                            if sent.is_err() {
                                return Ok(());
                            }
                            break;
                        }
                        ack = acks.recv() => {
                            if ack.is_none() {
                                return Ok(());
                            }
                        }
                    }
                }
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = &mut notified => {}
                ack = acks.recv() => {
                    if ack.is_none() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemSink {
    shared: Arc<Shared>,
    topic: String,
    closed: AtomicBool,
}

#[async_trait]
impl Statuser for MemSink {
    async fn status(&self) -> Result<Status> {
        Ok(self.shared.status())
    }
}

#[async_trait]
impl AsyncMessageSink for MemSink {
    async fn publish_messages(
        &self,
        cancel: CancellationToken,
        acks: mpsc::Sender<Message>,
        mut messages: mpsc::Receiver<Message>,
    ) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Closed);
        }
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                msg = messages.recv() => match msg {
                    Some(msg) => msg,
                    None => return Ok(()),
                },
            };

            self.shared.append(&self.topic, msg.clone());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                sent = acks.send(msg) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
