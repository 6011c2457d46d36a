//! Registry durability and concurrent lookups.

use super::harness::{all_caps, query_only, TestGateway};
use api_gateway::{GatewayError, Manifest, Registry};
use serde_json::{json, Value};
use shared_bus::{Entity, LocalRouter};
use std::sync::Arc;

#[tokio::test]
async fn test_restart_keeps_identities_and_keys() {
    let dir = tempfile::tempdir().unwrap();

    let gw = TestGateway::start(dir.path()).await;
    let (key, entity) = gw.register(all_caps()).await;
    let (status, _) = gw
        .call(
            &key,
            "publish",
            json!({"uri": "room/a", "ponum": "64.0.1.0", "contents": "before"}),
        )
        .await;
    assert_eq!(status, 200);
    gw.stop().await;

    let gw = TestGateway::start(dir.path()).await;
    let listing: Value = gw
        .client
        .get(gw.admin_url("/admin/entities"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["entities"], json!([entity.vk()]));
    assert_eq!(listing["keys"], 1);
    assert_eq!(listing["connections"], 1);

    // the key still works, on a fresh bus
    let (status, body) = gw.call(&key, "query", json!({"uri": "room/a"})).await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!([]));

    gw.stop().await;
}

#[tokio::test]
async fn test_reregistering_an_identity_issues_a_second_key() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;

    let entity = Entity::generate();
    let first = gw.register_entity(&entity, query_only()).await;
    let second = gw.register_entity(&entity, all_caps()).await;
    assert_ne!(first, second);

    // each key keeps its own capabilities
    let publish = json!({"uri": "room/a", "ponum": "64.0.1.0", "contents": "x"});
    assert_eq!(gw.call(&first, "publish", publish.clone()).await.0, 403);
    assert_eq!(gw.call(&second, "publish", publish).await.0, 200);

    gw.stop().await;
}

#[tokio::test]
async fn test_registry_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let gw = TestGateway::start(dir.path()).await;

    let router = LocalRouter::new();
    let second = Registry::open(dir.path(), false, Arc::new(router.agent())).await;
    assert!(matches!(second, Err(GatewayError::Storage(_))));

    gw.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_while_registering() {
    let dir = tempfile::tempdir().unwrap();
    let router = LocalRouter::new();
    let registry = Arc::new(
        Registry::open(dir.path(), false, Arc::new(router.agent()))
            .await
            .unwrap(),
    );

    let (seed_key, _) = registry
        .register(&Entity::generate().to_material(), Manifest::query_only())
        .await
        .unwrap();

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let key = seed_key.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let record = registry.get_permission(&key).unwrap();
                    assert!(record.can_query());
                    let (_, conn) = registry.resolve(&key).unwrap();
                    assert_eq!(conn.vk(), record.vk);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let mut keys = Vec::new();
                for _ in 0..10 {
                    let (key, _) = registry
                        .register(&Entity::generate().to_material(), Manifest::all())
                        .await
                        .unwrap();
                    keys.push(key);
                }
                keys
            })
        })
        .collect();

    for reader in readers {
        reader.await.unwrap();
    }
    let mut issued = Vec::new();
    for writer in writers {
        issued.extend(writer.await.unwrap());
    }

    assert_eq!(issued.len(), 40);
    for key in &issued {
        assert!(registry.get_permission(key).unwrap().can_publish());
    }
    assert_eq!(registry.keys().unwrap().len(), 41);
    assert_eq!(registry.entities().unwrap().len(), 41);
    assert_eq!(registry.connection_count(), 41);
    assert!(matches!(
        registry.get_permission("missing"),
        Err(GatewayError::UnknownKey)
    ));
}
