//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pubsub_gateway::backend::MemBackend;
use pubsub_gateway::config::GatewayConfig;
use pubsub_gateway::security::AclConfig;
use pubsub_gateway::{Gateway, Shutdown, StatusChecker};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A gateway serving on ephemeral local ports over a shared in-memory backend.
pub struct TestGateway {
    pub session_addr: SocketAddr,
    pub probe_addr: SocketAddr,
    pub backend: MemBackend,
    pub checker: StatusChecker,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn probe_url(&self, path: &str) -> String {
        format!("http://{}{}", self.probe_addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(
    configure: impl FnOnce(&mut GatewayConfig),
    acl: Option<AclConfig>,
) -> TestGateway {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.probe.bind_address = "127.0.0.1:0".into();
    configure(&mut config);

    let backend = MemBackend::new();
    let shutdown = Shutdown::new();
    let gateway = Gateway::new(
        config,
        Arc::new(backend.clone()),
        Arc::new(backend.clone()),
        acl,
        shutdown.clone(),
    );
    let checker = gateway.checker().clone();
    let listeners = gateway.bind().await.unwrap();
    let session_addr = listeners.session_addr().unwrap();
    let probe_addr = listeners.probe_addr().unwrap();

    tokio::spawn(async move {
        let _ = gateway.run(listeners).await;
    });

    TestGateway {
        session_addr,
        probe_addr,
        backend,
        checker,
        shutdown,
    }
}

/// Open a session socket, optionally presenting client credentials.
pub async fn connect(
    addr: SocketAddr,
    path: &str,
    credentials: Option<(&str, &str)>,
) -> Result<Ws, tokio_tungstenite::tungstenite::Error> {
    let mut request = format!("ws://{addr}{path}").into_client_request()?;
    if let Some((id, secret)) = credentials {
        let headers = request.headers_mut();
        headers.insert("x-client-id", id.parse().unwrap());
        headers.insert("x-client-secret", secret.parse().unwrap());
    }
    let (ws, _) = connect_async(request).await?;
    Ok(ws)
}

pub async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

pub enum Frame {
    Json(Value),
    Closed(Option<CloseFrame>),
}

/// Next data frame or the close frame, whichever comes first.
pub async fn next_frame(ws: &mut Ws) -> Frame {
    let read = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Frame::Json(serde_json::from_str(text.as_str()).unwrap())
                }
                Some(Ok(Message::Close(frame))) => return Frame::Closed(frame),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Frame::Closed(None),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("no frame within 5s")
}

pub async fn next_json(ws: &mut Ws) -> Value {
    match next_frame(ws).await {
        Frame::Json(value) => value,
        Frame::Closed(frame) => panic!("socket closed instead: {frame:?}"),
    }
}

pub async fn expect_close(ws: &mut Ws) -> Option<CloseFrame> {
    match next_frame(ws).await {
        Frame::Closed(frame) => frame,
        Frame::Json(value) => panic!("expected close, got {value}"),
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

pub async fn get_json(url: &str) -> (u16, Value) {
    let res = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(url)
        .send()
        .await
        .unwrap();
    let status = res.status().as_u16();
    (status, res.json().await.unwrap())
}

pub async fn get_status(url: &str) -> u16 {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(url)
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}
