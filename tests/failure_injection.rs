//! Failure injection tests: status faults, eviction, refused connections, shutdown.

use serde_json::json;

mod common;
use common::*;

async fn open_consumer(gw: &TestGateway, topic: &str) -> Ws {
    let mut ws = connect(gw.session_addr, "/consume", None).await.unwrap();
    send_json(
        &mut ws,
        json!({"start": {"topic": topic, "consumer": "group"}}),
    )
    .await;
    ws
}

#[tokio::test]
async fn failing_backend_is_reported_then_evicted() {
    let gw = start_gateway(|c| c.health.max_failed_checks = 2, None).await;

    let mut consumer = open_consumer(&gw, "orders").await;
    wait_until(|| gw.checker.len() == 1).await;

    let (status, report) = get_json(&gw.probe_url("/__/health")).await;
    assert_eq!(status, 200);
    assert_eq!(report["health"], "healthy");
    assert_eq!(report["checks"][0]["output"], "1/1 backend connections working;");

    gw.backend.set_status_fault(Some("broker unreachable"));

    // first failed check: reported, not yet evicted
    let (_, report) = get_json(&gw.probe_url("/__/health")).await;
    assert_eq!(report["health"], "unhealthy");
    assert_eq!(
        report["checks"][0]["output"],
        "0/1 backend connections working;broker unreachable"
    );
    assert_eq!(
        report["checks"][0]["action"],
        "Troubleshoot the gateway backend."
    );
    assert_eq!(gw.checker.len(), 1);

    // second failed check crosses the threshold
    assert_eq!(get_status(&gw.probe_url("/__/ready")).await, 503);

    let frame = expect_close(&mut consumer).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1000);
    wait_until(|| gw.checker.is_empty()).await;

    let (_, report) = get_json(&gw.probe_url("/__/health")).await;
    assert_eq!(report["health"], "healthy");
    assert_eq!(report["checks"][0]["output"], "no active connections");
    assert_eq!(get_status(&gw.probe_url("/__/ready")).await, 200);
}

#[tokio::test]
async fn success_resets_failure_count() {
    let gw = start_gateway(|c| c.health.max_failed_checks = 2, None).await;

    let _a = open_consumer(&gw, "a").await;
    let _b = open_consumer(&gw, "b").await;
    wait_until(|| gw.checker.len() == 2).await;

    gw.backend.set_status_fault(Some("slow disk"));
    let (_, report) = get_json(&gw.probe_url("/__/health")).await;
    assert_eq!(report["health"], "unhealthy");

    gw.backend.set_status_fault(None);
    let (_, report) = get_json(&gw.probe_url("/__/health")).await;
    assert_eq!(report["health"], "healthy");

    // one more failure would evict had the first one not been reset
    gw.backend.set_status_fault(Some("slow disk"));
    let (_, report) = get_json(&gw.probe_url("/__/health")).await;
    assert_eq!(report["health"], "unhealthy");
    assert_eq!(gw.checker.len(), 2);
}

#[tokio::test]
async fn refused_connection_is_never_tracked() {
    let gw = start_gateway(|_| {}, None).await;
    gw.backend.set_refuse_connections(true);

    let mut consumer = open_consumer(&gw, "orders").await;
    let frame = expect_close(&mut consumer).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1011);
    assert!(frame.reason.as_str().contains("refusing connections"));
    assert!(gw.checker.is_empty());

    let (_, report) = get_json(&gw.probe_url("/__/health")).await;
    assert_eq!(report["health"], "healthy");
}

#[tokio::test]
async fn shutdown_ends_open_sessions() {
    let gw = start_gateway(|_| {}, None).await;

    let mut consumer = open_consumer(&gw, "orders").await;
    wait_until(|| gw.checker.len() == 1).await;

    gw.shutdown.trigger();
    expect_close(&mut consumer).await;
    wait_until(|| gw.checker.is_empty()).await;
}

#[tokio::test]
async fn metrics_endpoint_is_absent_without_a_recorder() {
    let gw = start_gateway(|_| {}, None).await;
    assert_eq!(get_status(&gw.probe_url("/__/metrics")).await, 404);
}
