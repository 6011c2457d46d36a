//! `/call` and admin flows over real HTTP.

use super::harness::{all_caps, query_only, TestGateway};
use serde_json::{json, Value};

fn parse(body: &[u8]) -> Value {
    serde_json::from_slice(body).expect("json body")
}

#[tokio::test]
async fn test_register_then_query_empty() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;

    let (key, _) = gw.register(query_only()).await;
    let (status, body) = gw.call(&key, "query", json!({"uri": "room/a"})).await;
    assert_eq!(status, 200);
    assert_eq!(parse(&body), json!([]));

    gw.stop().await;
}

#[tokio::test]
async fn test_publish_without_capability_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;

    let (key, _) = gw.register(query_only()).await;
    let (status, body) = gw
        .call(
            &key,
            "publish",
            json!({"uri": "room/a", "ponum": "64.0.1.0", "contents": "hi"}),
        )
        .await;
    assert_eq!(status, 403);
    assert!(String::from_utf8_lossy(&body).contains("publish"));
    assert_eq!(gw.router.messages_published(), 0);

    gw.stop().await;
}

#[tokio::test]
async fn test_publish_then_query() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;

    let (key, _) = gw.register(all_caps()).await;
    let (status, body) = gw
        .call(
            &key,
            "publish",
            json!({
                "uri": "room/a",
                "ponum": "2.0.3.1",
                "contents": {"temp": 21, "unit": "C"},
                "persist": true,
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body.is_empty());

    let (status, body) = gw
        .call(&key, "query", json!({"uri": "room/+", "ponum": "2.0.0.0/8"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(parse(&body), json!([{"temp": 21, "unit": "C"}]));

    // filter excludes the structured object
    let (status, body) = gw
        .call(&key, "query", json!({"uri": "room/a", "ponum": "64.0.0.0/4"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(parse(&body), json!([]));

    gw.stop().await;
}

#[tokio::test]
async fn test_unknown_key_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;

    let (status, _) = gw.call("not-a-key", "query", json!({"uri": "room/a"})).await;
    assert_eq!(status, 401);

    gw.stop().await;
}

#[tokio::test]
async fn test_bad_envelopes() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;
    let (key, _) = gw.register(all_caps()).await;

    // subscribe is streaming only
    let (status, _) = gw.call(&key, "subscribe", json!({"uri": "room/a"})).await;
    assert_eq!(status, 404);

    let (status, _) = gw.call(&key, "query", json!({})).await;
    assert_eq!(status, 400);

    let (status, _) = gw
        .call(
            &key,
            "publish",
            json!({"uri": "room/a", "ponum": "1.0.0.0", "contents": 1}),
        )
        .await;
    assert_eq!(status, 400);

    let resp = gw
        .client
        .post(gw.call_url())
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    gw.stop().await;
}

#[tokio::test]
async fn test_revoked_key_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;

    let (key, _) = gw.register(query_only()).await;
    let (status, _) = gw.call(&key, "query", json!({"uri": "room/a"})).await;
    assert_eq!(status, 200);

    let resp = gw
        .client
        .delete(gw.admin_url(&format!("/admin/keys/{}", key)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let (status, _) = gw.call(&key, "query", json!({"uri": "room/a"})).await;
    assert_eq!(status, 401);

    // second revoke finds nothing
    let resp = gw
        .client
        .delete(gw.admin_url(&format!("/admin/keys/{}", key)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    gw.stop().await;
}

#[tokio::test]
async fn test_admin_metrics_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;
    let (key, _) = gw.register(query_only()).await;
    gw.call(&key, "query", json!({"uri": "room/a"})).await;
    gw.call("nope", "query", json!({"uri": "room/a"})).await;

    let metrics: Value = gw
        .client
        .get(gw.admin_url("/admin/metrics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["calls"]["total"], 2);
    assert_eq!(metrics["errors"]["unknown_key"], 1);
    assert_eq!(metrics["registry"]["registrations"], 1);

    let health: Value = gw
        .client
        .get(format!("http://{}/health", gw.http))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["connections"], 1);

    gw.stop().await;
}
