//! `/streaming` sessions over a real WebSocket.

use super::harness::{all_caps, query_only, TestGateway};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(gw: &TestGateway) -> Client {
    let (ws, _) = connect_async(gw.streaming_url()).await.expect("ws connect");
    ws
}

async fn subscribe(ws: &mut Client, key: &str, uri: &str) {
    let envelope = json!({"key": key, "proc": "subscribe", "params": {"uri": uri}});
    ws.send(Message::Text(envelope.to_string())).await.unwrap();
}

/// Next text frame as JSON, skipping pings.
async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("frame");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn publish_text(gw: &TestGateway, key: &str, uri: &str, text: &str) {
    let (status, _) = gw
        .call(
            key,
            "publish",
            json!({"uri": uri, "ponum": "64.0.1.0", "contents": text}),
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_subscribe_receives_published_values() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;
    let (key, _) = gw.register(all_caps()).await;

    let mut ws = connect(&gw).await;
    subscribe(&mut ws, &key, "room/+").await;
    gw.wait_for_subscriptions(1).await;

    publish_text(&gw, &key, "room/a", "hello").await;
    publish_text(&gw, &key, "hall/a", "ignored").await;
    publish_text(&gw, &key, "room/b", "world").await;

    assert_eq!(next_json(&mut ws).await, json!("hello"));
    assert_eq!(next_json(&mut ws).await, json!("world"));

    ws.close(None).await.unwrap();
    drop(ws);
    gw.wait_for_subscriptions(0).await;

    gw.stop().await;
}

#[tokio::test]
async fn test_two_subscriptions_in_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;
    let (key, _) = gw.register(all_caps()).await;

    let mut ws = connect(&gw).await;
    subscribe(&mut ws, &key, "room/a").await;
    subscribe(&mut ws, &key, "room/b").await;
    gw.wait_for_subscriptions(2).await;

    publish_text(&gw, &key, "room/b", "bee").await;
    assert_eq!(next_json(&mut ws).await, json!("bee"));
    publish_text(&gw, &key, "room/a", "ay").await;
    assert_eq!(next_json(&mut ws).await, json!("ay"));

    drop(ws);
    gw.wait_for_subscriptions(0).await;

    gw.stop().await;
}

#[tokio::test]
async fn test_subscribe_without_capability_sends_error_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;
    let (key, _) = gw.register(query_only()).await;

    let mut ws = connect(&gw).await;
    subscribe(&mut ws, &key, "room/a").await;

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["status"], 403);
    assert!(frame["error"].as_str().unwrap().contains("subscribe"));

    let close = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("close in time")
        .expect("stream open")
        .expect("frame");
    match close {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Policy),
        other => panic!("expected close frame, got {:?}", other),
    }
    assert_eq!(gw.router.active_subscriptions(), 0);

    gw.stop().await;
}

#[tokio::test]
async fn test_unknown_key_sends_unauthorized_frame() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;

    let mut ws = connect(&gw).await;
    subscribe(&mut ws, "nope", "room/a").await;

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["status"], 401);

    gw.stop().await;
}

#[tokio::test]
async fn test_oversized_envelope_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start_with(dir.path(), |config| {
        config.websocket.max_message_size = 1024;
    })
    .await;
    let (key, _) = gw.register(all_caps()).await;

    let mut ws = connect(&gw).await;
    let envelope = json!({
        "key": key,
        "proc": "subscribe",
        "params": {"uri": "room/a", "padding": "x".repeat(4096)},
    });
    ws.send(Message::Text(envelope.to_string())).await.unwrap();

    // an error frame at most, then the socket ends
    let frames = tokio::time::timeout(Duration::from_secs(5), async {
        let mut texts = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => texts.push(serde_json::from_str::<Value>(&text).unwrap()),
                Message::Close(_) => break,
                _ => {}
            }
        }
        texts
    })
    .await
    .expect("session ends");
    assert!(frames.len() <= 1);
    for frame in &frames {
        assert_eq!(frame["status"], 400);
    }
    assert_eq!(gw.router.active_subscriptions(), 0);

    gw.stop().await;
}

#[tokio::test]
async fn test_malformed_pattern_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;
    let (key, _) = gw.register(all_caps()).await;

    let mut ws = connect(&gw).await;
    subscribe(&mut ws, &key, "room/*/a").await;

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["status"], 400);
    assert_eq!(gw.router.active_subscriptions(), 0);

    gw.stop().await;
}

#[tokio::test]
async fn test_shutdown_ends_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;
    let (key, _) = gw.register(all_caps()).await;

    let mut ws = connect(&gw).await;
    subscribe(&mut ws, &key, "room/a").await;
    gw.wait_for_subscriptions(1).await;

    let router = std::sync::Arc::clone(&gw.router);
    gw.stop().await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while router.active_subscriptions() != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscriptions released");

    // the client sees the socket end
    let end = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(end.is_ok());
}
