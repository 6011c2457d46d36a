//! # Registry
//!
//! Maps API keys to permission records and identities to live bus
//! connections.
//!
//! ```text
//! API key ──→ PermissionRecord{vk, caps} ──→ connection cache[vk] ──→ BusConnection
//!               (RocksDB: permissions)         (in memory, rebuilt
//!                                               from RocksDB: entity)
//! ```
//!
//! Connections are never persisted. On open, every stored identity is
//! bound again through the bus agent.

pub mod lock;
pub mod store;

pub use lock::{LockError, RegistryLock};
pub use store::RegistryStore;

use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::permissions::{Manifest, PermissionRecord};
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use shared_bus::{encode_vk, BusAgent, BusConnection, Entity};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes of randomness in an API key
pub const API_KEY_BYTES: usize = 32;

/// Issue a fresh API key: 256 bits from the OS CSPRNG, lowercase hex.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Short SHA-256 fingerprint of an API key, for log lines.
pub fn key_fingerprint(key: &str) -> String {
    hex::encode(&Sha256::digest(key.as_bytes())[..8])
}

/// Durable permission store plus live connection cache.
pub struct Registry {
    store: RegistryStore,
    agent: Arc<dyn BusAgent>,
    connections: RwLock<HashMap<String, Arc<dyn BusConnection>>>,
    _lock: RegistryLock,
}

impl Registry {
    /// Lock and open the registry at `path`, then bind every stored identity.
    ///
    /// An identity that fails to bind, or binds to a different VK than the
    /// one it is stored under, is logged and skipped.
    pub async fn open(
        path: &Path,
        sync_writes: bool,
        agent: Arc<dyn BusAgent>,
    ) -> GatewayResult<Self> {
        let lock = RegistryLock::acquire(path).map_err(|e| GatewayError::Storage(e.to_string()))?;
        let store = RegistryStore::open(path, sync_writes)?;

        let registry = Self {
            store,
            agent,
            connections: RwLock::new(HashMap::new()),
            _lock: lock,
        };

        let stored = registry.store.entities()?;
        let total = stored.len();
        for (vk_bytes, payload) in stored {
            let vk = encode_vk(&vk_bytes);
            match registry.agent.bind(&payload).await {
                Ok(conn) if conn.vk() == vk => {
                    registry.connections.write().insert(vk, conn);
                }
                Ok(conn) => {
                    warn!(stored_vk = %vk, bound_vk = %conn.vk(), "Entity bound to unexpected VK, skipping");
                }
                Err(e) => {
                    warn!(vk = %vk, error = %e, "Could not bind stored entity, skipping");
                }
            }
        }

        info!(
            path = %path.display(),
            agent = registry.agent.address(),
            entities = total,
            connected = registry.connection_count(),
            "Registry opened"
        );

        Ok(registry)
    }

    /// Parse and persist tagged identity material, then connect it.
    ///
    /// A bind failure is logged; the entity is still stored and will be
    /// bound on the next open.
    pub async fn add_entity(&self, material: &[u8]) -> GatewayResult<String> {
        let entity = Entity::from_material(material)?;
        let vk = entity.vk();
        let payload = entity.payload();

        self.store.put_entity(&entity.vk_bytes(), &payload)?;

        match self.agent.bind(&payload).await {
            Ok(conn) => {
                self.connections.write().insert(vk.clone(), conn);
                debug!(vk = %vk, "Entity added and connected");
            }
            Err(e) => warn!(vk = %vk, error = %e, "Entity stored but could not be bound"),
        }

        Ok(vk)
    }

    /// Persist a permission record under `key`, overwriting on collision.
    pub fn add_permission(&self, key: &str, record: &PermissionRecord) -> GatewayResult<()> {
        self.store.put_permission(key, record)
    }

    /// Look up the record for `key`.
    pub fn get_permission(&self, key: &str) -> GatewayResult<PermissionRecord> {
        self.store.get_permission(key)?.ok_or(GatewayError::UnknownKey)
    }

    /// Cached connection for a VK. Never blocks on the bus.
    pub fn connection_for(&self, vk: &str) -> Option<Arc<dyn BusConnection>> {
        self.connections.read().get(vk).cloned()
    }

    /// Record and connection for `key`, as used by every request.
    pub fn resolve(&self, key: &str) -> GatewayResult<(PermissionRecord, Arc<dyn BusConnection>)> {
        let record = self.get_permission(key)?;
        let conn = self
            .connection_for(&record.vk)
            .ok_or_else(|| GatewayError::BusUnavailable(record.vk.clone()))?;
        Ok((record, conn))
    }

    /// Store an identity and issue a new key for it with `manifest`'s
    /// capabilities. The record's VK always comes from the material.
    pub async fn register(
        &self,
        material: &[u8],
        manifest: Manifest,
    ) -> GatewayResult<(String, PermissionRecord)> {
        let vk = self.add_entity(material).await?;
        let key = generate_api_key();
        let record = PermissionRecord::new(key.clone(), vk, manifest);
        self.add_permission(&key, &record)?;
        info!(vk = %record.vk, key_id = %key_fingerprint(&key), "API key registered");
        Ok((key, record))
    }

    /// Delete the record for `key`. Returns whether it existed.
    pub fn revoke(&self, key: &str) -> GatewayResult<bool> {
        let existed = self.store.delete_permission(key)?;
        if existed {
            info!(key_id = %key_fingerprint(key), "API key revoked");
        }
        Ok(existed)
    }

    /// VKs of every stored identity.
    pub fn entities(&self) -> GatewayResult<Vec<String>> {
        Ok(self
            .store
            .entities()?
            .into_iter()
            .map(|(vk, _)| encode_vk(&vk))
            .collect())
    }

    /// Every issued API key.
    pub fn keys(&self) -> GatewayResult<Vec<String>> {
        self.store.permission_keys()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}
