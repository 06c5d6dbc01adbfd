//! Structured logging.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to this crate
//! and `tower_http`, raised to `debug` in debug mode.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn default_filter(log_level: &str, debug: bool) -> String {
    let level = if debug { "debug" } else { log_level };
    format!("pubsub_gateway={level},tower_http={level}")
}

pub fn init_logging(log_level: &str, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(log_level, debug).into());

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
