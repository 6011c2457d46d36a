//! A gateway on ephemeral localhost ports, backed by a temp registry and
//! the in-process bus.

use api_gateway::{GatewayConfig, GatewayResult, GatewayService, Registry};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use shared_bus::{Entity, LocalRouter};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Manifest JSON granting every capability
pub fn all_caps() -> Value {
    json!({"subscribe": {"allowed": true}, "publish": {"allowed": true}, "query": {"allowed": true}})
}

/// Manifest JSON granting only query
pub fn query_only() -> Value {
    json!({"query": {"allowed": true}})
}

/// Open the registry, retrying while a stopped gateway's sessions wind down
/// and release the lock.
async fn open_registry(dir: &Path, router: &Arc<LocalRouter>) -> Registry {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match Registry::open(dir, false, Arc::new(router.agent())).await {
            Ok(registry) => return registry,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("open registry: {}", e),
        }
    }
}

pub struct TestGateway {
    pub http: SocketAddr,
    pub admin: SocketAddr,
    pub router: Arc<LocalRouter>,
    pub client: reqwest::Client,
    shutdown: CancellationToken,
    task: JoinHandle<GatewayResult<()>>,
}

impl TestGateway {
    /// Start on a registry in `dir`.
    pub async fn start(dir: &Path) -> Self {
        Self::start_with(dir, |_| {}).await
    }

    /// Start with `configure` applied on top of the test defaults.
    pub async fn start_with(dir: &Path, configure: impl FnOnce(&mut GatewayConfig)) -> Self {
        let router = LocalRouter::new();
        let registry = open_registry(dir, &router).await;

        let mut config = GatewayConfig::default();
        config.storage.path = dir.to_path_buf();
        config.timeouts.call = Duration::from_secs(5);
        // ports come from the pre-bound listeners
        config.admin.port = 0;
        config.http.port = 1;
        configure(&mut config);

        let service = GatewayService::new(config, Arc::new(registry)).expect("valid config");
        let http = TcpListener::bind("127.0.0.1:0").await.expect("bind http");
        let admin = TcpListener::bind("127.0.0.1:0").await.expect("bind admin");
        let http_addr = http.local_addr().expect("http addr");
        let admin_addr = admin.local_addr().expect("admin addr");

        let shutdown = service.shutdown_token();
        let task = tokio::spawn(async move { service.serve(http, Some(admin)).await });

        Self {
            http: http_addr,
            admin: admin_addr,
            router,
            client: reqwest::Client::new(),
            shutdown,
            task,
        }
    }

    pub fn call_url(&self) -> String {
        format!("http://{}/call", self.http)
    }

    pub fn streaming_url(&self) -> String {
        format!("ws://{}/streaming", self.http)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin, path)
    }

    /// Register a fresh identity through the admin server.
    pub async fn register(&self, permissions: Value) -> (String, Entity) {
        let entity = Entity::generate();
        let key = self.register_entity(&entity, permissions).await;
        (key, entity)
    }

    /// Register `entity` through the admin server and return the key.
    pub async fn register_entity(&self, entity: &Entity, permissions: Value) -> String {
        let resp = self
            .client
            .post(self.admin_url("/admin/register"))
            .json(&json!({
                "entity": STANDARD.encode(entity.to_material()),
                "permissions": permissions,
            }))
            .send()
            .await
            .expect("register request");
        assert_eq!(resp.status(), 200, "register failed");
        let body: Value = resp.json().await.expect("register reply");
        assert_eq!(body["vk"], entity.vk());
        body["key"].as_str().expect("key").to_string()
    }

    /// POST an envelope to `/call`.
    pub async fn call(&self, key: &str, proc: &str, params: Value) -> (u16, bytes::Bytes) {
        let resp = self
            .client
            .post(self.call_url())
            .json(&json!({"key": key, "proc": proc, "params": params}))
            .send()
            .await
            .expect("call request");
        let status = resp.status().as_u16();
        (status, resp.bytes().await.expect("call body"))
    }

    /// Wait until the bus reports `n` active subscriptions.
    pub async fn wait_for_subscriptions(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.router.active_subscriptions() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {} subscriptions, have {}",
                n,
                self.router.active_subscriptions()
            )
        });
    }

    /// Stop both servers and release the registry.
    pub async fn stop(self) {
        self.shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("gateway stops")
            .expect("gateway task");
        assert!(result.is_ok(), "gateway error: {:?}", result);
    }
}
