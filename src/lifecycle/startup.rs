//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the factory chain: backend → instrumentation → access control
//! - Own the status checker shared by instrumentation, probe and monitor
//! - Bind both listeners and serve them until shutdown
//!
//! # Design Decisions
//! - Access control is outermost so denied requests never reach a backend or the registry
//! - The metrics recorder must be installed before `Gateway::new`; counters are
//!   resolved when the session servers are built
//! - Listeners are bound separately from serving so callers can learn the addresses

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::backend::{MemBackend, SinkFactory, SourceFactory};
use crate::config::{BackendConfig, ConfigError, GatewayConfig};
use crate::health::{HealthMonitor, StatusChecker};
use crate::http::{probe_router, serve, session_router, AppState, ProbeState};
use crate::instrumented::{
    InstrumentedSinkFactory, InstrumentedSinkServer, InstrumentedSourceFactory,
    InstrumentedSourceServer,
};
use crate::lifecycle::shutdown::Shutdown;
use crate::security::{AclConfig, AclSinkFactory, AclSourceFactory};
use crate::session::{SinkServer, SourceServer};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

/// Source and sink factories for the configured backend.
pub fn backend_factories(config: &BackendConfig) -> (Arc<dyn SourceFactory>, Arc<dyn SinkFactory>) {
    match config {
        BackendConfig::Mem => {
            let mem = MemBackend::new();
            (Arc::new(mem.clone()), Arc::new(mem))
        }
    }
}

/// Bound but not yet serving.
pub struct Listeners {
    pub sessions: TcpListener,
    pub probe: TcpListener,
}

impl Listeners {
    pub fn session_addr(&self) -> io::Result<SocketAddr> {
        self.sessions.local_addr()
    }

    pub fn probe_addr(&self) -> io::Result<SocketAddr> {
        self.probe.local_addr()
    }
}

pub struct Gateway {
    config: GatewayConfig,
    checker: StatusChecker,
    shutdown: Shutdown,
    sources: Arc<InstrumentedSourceServer>,
    sinks: Arc<InstrumentedSinkServer>,
    metrics: Option<PrometheusHandle>,
}

impl Gateway {
    /// Assemble a gateway over the backend named in `config`, loading the ACL file if
    /// one is configured.
    pub fn from_config(config: GatewayConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        let acl = config
            .acl_config
            .as_deref()
            .map(AclConfig::from_file)
            .transpose()?;
        if let Some(acl) = &acl {
            tracing::info!(clients = acl.clients.len(), "Access control enabled");
        }
        let (sources, sinks) = backend_factories(&config.backend);
        Ok(Self::new(config, sources, sinks, acl, shutdown))
    }

    pub fn new(
        config: GatewayConfig,
        sources: Arc<dyn SourceFactory>,
        sinks: Arc<dyn SinkFactory>,
        acl: Option<AclConfig>,
        shutdown: Shutdown,
    ) -> Self {
        let checker = StatusChecker::new(
            config.health.max_failed_checks,
            Duration::from_secs(config.health.probe_timeout_secs),
        );

        let mut sources: Arc<dyn SourceFactory> = Arc::new(InstrumentedSourceFactory {
            checker: checker.clone(),
            next: sources,
        });
        let mut sinks: Arc<dyn SinkFactory> = Arc::new(InstrumentedSinkFactory {
            checker: checker.clone(),
            next: sinks,
        });
        if let Some(acl) = acl {
            let acl = Arc::new(acl);
            sources = Arc::new(AclSourceFactory {
                config: acl.clone(),
                next: sources,
            });
            sinks = Arc::new(AclSinkFactory {
                config: acl,
                next: sinks,
            });
        }

        let capacity = config.session.channel_capacity;
        let sources = InstrumentedSourceServer::new(
            SourceServer::new(sources, shutdown.token(), capacity),
            config.debug,
        );
        let sinks = InstrumentedSinkServer::new(
            SinkServer::new(sinks, shutdown.token(), capacity),
            config.debug,
        );

        Self {
            config,
            checker,
            shutdown,
            sources: Arc::new(sources),
            sinks: Arc::new(sinks),
            metrics: None,
        }
    }

    /// Expose `handle` on the metrics endpoint.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn checker(&self) -> &StatusChecker {
        &self.checker
    }

    pub async fn bind(&self) -> Result<Listeners, StartupError> {
        Ok(Listeners {
            sessions: bind(&self.config.listener.bind_address).await?,
            probe: bind(&self.config.probe.bind_address).await?,
        })
    }

    /// Serve until shutdown is triggered or a listener fails.
    pub async fn run(self, listeners: Listeners) -> Result<(), StartupError> {
        let token = self.shutdown.token();
        let endpoints = self.config.enabled_endpoints();
        tracing::info!(
            endpoints = ?endpoints.iter().map(|e| e.as_str()).collect::<Vec<_>>(),
            max_failed_checks = self.config.health.max_failed_checks,
            "Gateway starting"
        );

        let monitor = tokio::spawn(
            HealthMonitor::new(self.checker.clone(), self.config.health.clone()).run(token.clone()),
        );

        let sessions = session_router(
            AppState {
                sources: self.sources,
                sinks: self.sinks,
            },
            &endpoints,
        );
        let probe = probe_router(ProbeState {
            checker: self.checker,
            metrics: self.metrics.filter(|_| self.config.probe.metrics_enabled),
        });

        let served = tokio::try_join!(
            serve("sessions", listeners.sessions, sessions, token.clone()),
            serve("probe", listeners.probe, probe, token.clone()),
        );

        // A failed listener takes the rest of the gateway down with it.
        token.cancel();
        if let Err(e) = monitor.await {
            tracing::warn!(error = %e, "Health monitor task failed");
        }

        served?;
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}
