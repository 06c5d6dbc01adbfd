//! End-to-end session tests over the WebSocket endpoints.

use serde_json::json;

use pubsub_gateway::config::Endpoint;
use pubsub_gateway::security::AclConfig;

mod common;
use common::*;

#[tokio::test]
async fn published_messages_reach_a_consumer() {
    let gw = start_gateway(|_| {}, None).await;

    let mut publisher = connect(gw.session_addr, "/publish", None).await.unwrap();
    send_json(&mut publisher, json!({"start": {"topic": "orders"}})).await;
    send_json(
        &mut publisher,
        json!({"messages": [
            {"id": "m1", "data": "aGVsbG8="},
            {"id": "m2", "data": "d29ybGQ="},
        ]}),
    )
    .await;
    assert_eq!(next_json(&mut publisher).await, json!({"confirm": {"msg_id": "m1"}}));
    assert_eq!(next_json(&mut publisher).await, json!({"confirm": {"msg_id": "m2"}}));
    assert_eq!(gw.backend.topic_len("orders"), 2);

    let mut consumer = connect(gw.session_addr, "/consume", None).await.unwrap();
    send_json(
        &mut consumer,
        json!({"start": {"topic": "orders", "consumer": "billing", "initial_offset": "oldest"}}),
    )
    .await;
    for (id, data) in [("m1", "aGVsbG8="), ("m2", "d29ybGQ=")] {
        let frame = next_json(&mut consumer).await;
        assert_eq!(frame["message"]["id"], id);
        assert_eq!(frame["message"]["data"], data);
        send_json(&mut consumer, json!({"confirm": {"msg_id": id}})).await;
    }

    // both live sessions are health-tracked
    wait_until(|| gw.checker.len() == 2).await;
}

#[tokio::test]
async fn newest_consumer_only_sees_later_messages() {
    let gw = start_gateway(|_| {}, None).await;

    let mut publisher = connect(gw.session_addr, "/publish", None).await.unwrap();
    send_json(&mut publisher, json!({"start": {"topic": "events"}})).await;
    send_json(&mut publisher, json!({"messages": [{"id": "old", "data": ""}]})).await;
    next_json(&mut publisher).await;

    let mut consumer = connect(gw.session_addr, "/consume", None).await.unwrap();
    send_json(
        &mut consumer,
        json!({"start": {"topic": "events", "consumer": "late"}}),
    )
    .await;
    wait_until(|| gw.checker.len() == 2).await;

    send_json(&mut publisher, json!({"messages": [{"id": "new", "data": ""}]})).await;
    let frame = next_json(&mut consumer).await;
    assert_eq!(frame["message"]["id"], "new");
}

#[tokio::test]
async fn acl_denial_closes_with_policy_code() {
    let acl = AclConfig::from_toml(
        r#"
        [default]
        consume = ["public.*"]

        [[clients]]
        id = "billing"
        secret = "s3cret"
        publish = ["invoices"]
        "#,
    )
    .unwrap();
    let gw = start_gateway(|_| {}, Some(acl)).await;

    let mut anonymous = connect(gw.session_addr, "/publish", None).await.unwrap();
    send_json(&mut anonymous, json!({"start": {"topic": "invoices"}})).await;
    let frame = expect_close(&mut anonymous).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1008);
    assert!(frame.reason.as_str().starts_with("access denied"));
    assert!(gw.checker.is_empty());

    let mut billing = connect(gw.session_addr, "/publish", Some(("billing", "s3cret")))
        .await
        .unwrap();
    send_json(&mut billing, json!({"start": {"topic": "invoices"}})).await;
    send_json(&mut billing, json!({"messages": [{"id": "i1", "data": ""}]})).await;
    assert_eq!(next_json(&mut billing).await, json!({"confirm": {"msg_id": "i1"}}));
}

#[tokio::test]
async fn malformed_frame_is_a_protocol_error() {
    let gw = start_gateway(|_| {}, None).await;

    let mut ws = connect(gw.session_addr, "/consume", None).await.unwrap();
    send_json(&mut ws, json!({"subscribe": "orders"})).await;
    let frame = expect_close(&mut ws).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1002);
    assert!(frame.reason.as_str().contains("malformed frame"));
}

#[tokio::test]
async fn disabled_endpoint_is_not_served() {
    let gw = start_gateway(|c| c.endpoints = vec![Endpoint::Consume], None).await;

    assert!(connect(gw.session_addr, "/publish", None).await.is_err());
    assert!(connect(gw.session_addr, "/consume", None).await.is_ok());
}
