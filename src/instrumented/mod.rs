//! Instrumentation decorators.
//!
//! # Data Flow
//! ```text
//! factory.new_*(cancel, req)
//!     → next factory opens the backend connection
//!     → wrapped in InstrumentedSource / InstrumentedSink (counters resolved here)
//!     → pump entry: register with StatusChecker under a child token
//!     → pump exit:  deregister → close backend → count outcome
//! ```
//!
//! # Design Decisions
//! - A connection is health-tracked only while its pump runs
//! - Eviction cancels the pump's own child token, never the session's token
//! - Deregistration always happens before the backend connection is closed
//! - `close()` is idempotent so the session's own close after the pump is harmless

pub mod connection;
pub mod factory;
pub mod server;

pub use connection::{InstrumentedSink, InstrumentedSource};
pub use factory::{InstrumentedSinkFactory, InstrumentedSourceFactory};
pub use server::{InstrumentedSinkServer, InstrumentedSourceServer};
