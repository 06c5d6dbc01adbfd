//! Session servers that count failed sessions.

use metrics::Counter;

use crate::backend::Credentials;
use crate::error::Result;
use crate::observability::metrics::errors_counter;
use crate::session::{
    ConsumerRequest, ConsumerResponse, PublisherRequest, PublisherResponse, ServerStream,
    SinkServer, SourceServer,
};

struct ErrorTally {
    errors: Counter,
    debug: bool,
}

impl ErrorTally {
    fn new(debug: bool) -> Self {
        Self {
            errors: errors_counter(),
            debug,
        }
    }

    fn observe(&self, kind: &'static str, result: &Result<()>) {
        if let Err(e) = result {
            self.errors.increment(1);
            if self.debug {
                tracing::warn!(session = kind, error = %e, "Session ended with error");
            }
        }
    }
}

pub struct InstrumentedSourceServer {
    delegate: SourceServer,
    tally: ErrorTally,
}

impl InstrumentedSourceServer {
    pub fn new(delegate: SourceServer, debug: bool) -> Self {
        Self {
            delegate,
            tally: ErrorTally::new(debug),
        }
    }

    pub async fn consume<S>(&self, stream: &mut S, credentials: Option<Credentials>) -> Result<()>
    where
        S: ServerStream<ConsumerRequest, ConsumerResponse> + ?Sized,
    {
        let result = self.delegate.consume(stream, credentials).await;
        self.tally.observe("consume", &result);
        result
    }
}

pub struct InstrumentedSinkServer {
    delegate: SinkServer,
    tally: ErrorTally,
}

impl InstrumentedSinkServer {
    pub fn new(delegate: SinkServer, debug: bool) -> Self {
        Self {
            delegate,
            tally: ErrorTally::new(debug),
        }
    }

    pub async fn publish<S>(&self, stream: &mut S, credentials: Option<Credentials>) -> Result<()>
    where
        S: ServerStream<PublisherRequest, PublisherResponse> + ?Sized,
    {
        let result = self.delegate.publish(stream, credentials).await;
        self.tally.observe("publish", &result);
        result
    }
}
