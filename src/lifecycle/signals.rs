//! OS signal handling.
//!
//! SIGINT (Ctrl+C) and, on Unix, SIGTERM trigger graceful shutdown. A second signal
//! while draining is left to the default handler.

use crate::lifecycle::shutdown::Shutdown;

/// Wait for the first shutdown signal, then trigger `shutdown`.
///
/// Returns early without triggering if shutdown was already triggered elsewhere.
pub async fn wait_for_signal(shutdown: Shutdown) {
    tokio::select! {
        signal = terminate_signal() => {
            tracing::info!(signal, "Shutdown signal received");
            shutdown.trigger();
        }
        _ = shutdown.wait() => {}
    }
}

async fn terminate_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
