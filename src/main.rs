//! Pub/sub gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────────┐
//!                       │                    PUBSUB GATEWAY                     │
//!                       │                                                       │
//!   WebSocket client    │  ┌─────────┐   ┌─────────┐   ┌─────┐   ┌──────────┐   │
//!   ────────────────────┼─▶│  http   │──▶│ session │──▶│ acl │──▶│ instru-  │───┼──▶ Backend
//!   /consume /publish   │  │ server  │   │ server  │   │     │   │ mented   │   │
//!                       │  └─────────┘   └─────────┘   └─────┘   └────┬─────┘   │
//!                       │                                            │ track    │
//!                       │                                            ▼          │
//!   Prober              │  ┌─────────┐                        ┌────────────┐    │
//!   ────────────────────┼─▶│  probe  │───────────────────────▶│   status   │    │
//!   /__/health          │  │ server  │      check_status      │  checker   │    │
//!                       │  └─────────┘                        └────────────┘    │
//!                       └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pubsub_gateway::config::{
    load_config, validate_config, BackendConfig, ConfigError, Endpoint, GatewayConfig,
};
use pubsub_gateway::lifecycle::{wait_for_signal, Gateway, Shutdown};
use pubsub_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "pubsub-gateway", version)]
#[command(about = "WebSocket gateway in front of a pub/sub backend", long_about = None)]
struct Cli {
    /// TOML configuration file; flags below override it
    #[arg(long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Port for the session endpoints
    #[arg(long, env = "GATEWAY_PORT")]
    port: Option<u16>,

    /// Port for the health, readiness and metrics endpoints
    #[arg(long, env = "GATEWAY_PROBE_PORT")]
    probe_port: Option<u16>,

    /// Consecutive failed status checks before a backend connection is evicted
    #[arg(long, env = "GATEWAY_MAX_FAILED_CHECKS")]
    max_failed_checks: Option<u32>,

    /// Comma separated endpoints to serve (consume, publish)
    #[arg(long, env = "GATEWAY_ENDPOINTS", value_delimiter = ',')]
    endpoints: Vec<Endpoint>,

    /// Debug logging, including every failed session
    #[arg(long, env = "GATEWAY_DEBUG")]
    debug: bool,

    /// ACL file restricting which clients may use which topics
    #[arg(long, env = "GATEWAY_ACL_CONFIG")]
    acl_config: Option<PathBuf>,

    #[command(subcommand)]
    backend: Option<BackendCommand>,
}

#[derive(Subcommand)]
enum BackendCommand {
    /// In-memory backend
    Mem,
}

impl Cli {
    fn apply(self, config: &mut GatewayConfig) {
        if let Some(port) = self.port {
            config.listener.bind_address = with_port(&config.listener.bind_address, port);
        }
        if let Some(port) = self.probe_port {
            config.probe.bind_address = with_port(&config.probe.bind_address, port);
        }
        if let Some(max) = self.max_failed_checks {
            config.health.max_failed_checks = max;
        }
        if !self.endpoints.is_empty() {
            config.endpoints = self.endpoints;
        }
        if self.acl_config.is_some() {
            config.acl_config = self.acl_config;
        }
        config.debug |= self.debug;
        if let Some(BackendCommand::Mem) = self.backend {
            config.backend = BackendConfig::Mem;
        }
    }
}

/// Keep the configured host, swap the port. Unparseable addresses are left for
/// validation to report.
fn with_port(address: &str, port: u16) -> String {
    match address.parse::<SocketAddr>() {
        Ok(mut addr) => {
            addr.set_port(port);
            addr.to_string()
        }
        Err(_) => address.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability.log_level, config.debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pubsub-gateway starting");

    tracing::info!(
        listener = %config.listener.bind_address,
        probe = %config.probe.bind_address,
        backend = ?config.backend,
        "Configuration loaded"
    );

    // Counters are resolved while the gateway is assembled, so install first.
    let metrics_handle = if config.probe.metrics_enabled {
        Some(metrics::init_metrics()?)
    } else {
        None
    };

    let shutdown = Shutdown::new();
    let mut gateway = Gateway::from_config(config, shutdown.clone())?;
    if let Some(handle) = metrics_handle {
        gateway = gateway.with_metrics(handle);
    }

    let listeners = gateway.bind().await?;
    tokio::spawn(wait_for_signal(shutdown));
    gateway.run(listeners).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
