//! # RocksDB Registry Store
//!
//! Durable half of the registry.
//!
//! ## Column Families
//!
//! - `entity` - VK bytes -> identity payload bytes
//! - `permissions` - API key -> JSON permission record
//!
//! Reads take the shared lock; every mutation takes the exclusive lock and
//! is applied as one `WriteBatch`.

use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::permissions::PermissionRecord;
use parking_lot::RwLock;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Column family names
pub const CF_ENTITY: &str = "entity";
pub const CF_PERMISSIONS: &str = "permissions";

/// All column families used by the registry
pub const COLUMN_FAMILIES: &[&str] = &[CF_ENTITY, CF_PERMISSIONS];

/// RocksDB-backed registry store
pub struct RegistryStore {
    db: Arc<RwLock<DB>>,
    sync_writes: bool,
}

impl RegistryStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path, sync_writes: bool) -> GatewayResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors).map_err(|e| {
            GatewayError::Storage(format!("failed to open registry at {}: {}", path.display(), e))
        })?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            sync_writes,
        })
    }

    fn cf<'a>(db: &'a DB, name: &str) -> GatewayResult<&'a ColumnFamily> {
        db.cf_handle(name)
            .ok_or_else(|| GatewayError::Storage(format!("missing column family '{}'", name)))
    }

    fn write_opts(&self) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        write_opts
    }

    /// Persist an identity payload under its VK bytes.
    pub fn put_entity(&self, vk: &[u8], payload: &[u8]) -> GatewayResult<()> {
        let db = self.db.write();
        let mut batch = WriteBatch::default();
        batch.put_cf(Self::cf(&db, CF_ENTITY)?, vk, payload);
        db.write_opt(batch, &self.write_opts())?;
        Ok(())
    }

    /// Every stored `(VK bytes, payload)` pair.
    pub fn entities(&self) -> GatewayResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let db = self.db.read();
        let cf = Self::cf(&db, CF_ENTITY)?;
        db.iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(GatewayError::from)
            })
            .collect()
    }

    /// Persist a permission record under `key`, overwriting any previous one.
    pub fn put_permission(&self, key: &str, record: &PermissionRecord) -> GatewayResult<()> {
        let value = serde_json::to_vec(record)
            .map_err(|e| GatewayError::Internal(format!("failed to encode record: {}", e)))?;
        let db = self.db.write();
        let mut batch = WriteBatch::default();
        batch.put_cf(Self::cf(&db, CF_PERMISSIONS)?, key.as_bytes(), value);
        db.write_opt(batch, &self.write_opts())?;
        Ok(())
    }

    /// Look up a permission record. Missing or undecodable records are `None`.
    pub fn get_permission(&self, key: &str) -> GatewayResult<Option<PermissionRecord>> {
        let db = self.db.read();
        let cf = Self::cf(&db, CF_PERMISSIONS)?;
        let Some(raw) = db.get_pinned_cf(cf, key.as_bytes())? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, "Undecodable permission record");
                Ok(None)
            }
        }
    }

    /// Delete a permission record. Returns whether it existed.
    pub fn delete_permission(&self, key: &str) -> GatewayResult<bool> {
        let db = self.db.write();
        let cf = Self::cf(&db, CF_PERMISSIONS)?;
        if db.get_pinned_cf(cf, key.as_bytes())?.is_none() {
            return Ok(false);
        }
        let mut batch = WriteBatch::default();
        batch.delete_cf(cf, key.as_bytes());
        db.write_opt(batch, &self.write_opts())?;
        Ok(true)
    }

    /// Every stored API key.
    pub fn permission_keys(&self) -> GatewayResult<Vec<String>> {
        let db = self.db.read();
        let cf = Self::cf(&db, CF_PERMISSIONS)?;
        let mut keys = Vec::new();
        for item in db.iterator_cf(cf, IteratorMode::Start) {
            let (k, _) = item?;
            keys.push(String::from_utf8_lossy(&k).into_owned());
        }
        Ok(keys)
    }
}
