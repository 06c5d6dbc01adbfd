//! Session endpoint server.
//!
//! # Responsibilities
//! - Create the Axum router for the enabled session endpoints
//! - Extract client credentials from the upgrade request
//! - Hand each upgraded socket to the instrumented session server
//! - Serve a listener until the shutdown token fires

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::backend::Credentials;
use crate::config::Endpoint;
use crate::http::websocket::WsStream;
use crate::instrumented::{InstrumentedSinkServer, InstrumentedSourceServer};
use crate::session::{ConsumerRequest, ConsumerResponse, PublisherRequest, PublisherResponse};

pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const CLIENT_SECRET_HEADER: &str = "x-client-secret";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub sources: Arc<InstrumentedSourceServer>,
    pub sinks: Arc<InstrumentedSinkServer>,
}

/// Router exposing `/consume` and `/publish` for the given endpoints.
pub fn session_router(state: AppState, endpoints: &[Endpoint]) -> Router {
    let mut router = Router::new();
    for endpoint in endpoints {
        router = match endpoint {
            Endpoint::Consume => router.route("/consume", get(consume_handler)),
            Endpoint::Publish => router.route("/publish", get(publish_handler)),
        };
    }
    router.with_state(state).layer(TraceLayer::new_for_http())
}

/// Serve `router` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(server = name, address = %addr, "Server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!(server = name, "Server stopped");
    Ok(())
}

fn credentials(headers: &HeaderMap) -> Option<Credentials> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let client_id = header(CLIENT_ID_HEADER)?;
    Some(Credentials {
        client_id,
        secret: header(CLIENT_SECRET_HEADER).unwrap_or_default(),
    })
}

async fn consume_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credentials = credentials(&headers);
    ws.on_upgrade(move |socket| async move {
        let mut stream: WsStream<ConsumerRequest, ConsumerResponse> = WsStream::new(socket);
        let result = state.sources.consume(&mut stream, credentials).await;
        stream.finish(&result).await;
    })
}

async fn publish_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credentials = credentials(&headers);
    ws.on_upgrade(move |socket| async move {
        let mut stream: WsStream<PublisherRequest, PublisherResponse> = WsStream::new(socket);
        let result = state.sinks.publish(&mut stream, credentials).await;
        stream.finish(&result).await;
    })
}
