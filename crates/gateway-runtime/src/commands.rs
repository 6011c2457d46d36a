//! Subcommand implementations.
//!
//! `register`, `revoke` and `list` open the registry directly and so fail
//! while a proxy holds its lock; use the admin server in that case.

use anyhow::{Context, Result};
use api_gateway::{GatewayConfig, GatewayService, Manifest, Registry};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::select_agent;

async fn open_registry(config: &GatewayConfig) -> Result<Registry> {
    let agent = select_agent(config)?;
    Registry::open(&config.storage.path, config.storage.sync_writes, agent)
        .await
        .with_context(|| {
            format!(
                "failed to open registry at {} (is a proxy running? register through its admin server instead)",
                config.storage.path.display()
            )
        })
}

/// Run the gateway until Ctrl+C.
pub async fn proxy(config: GatewayConfig) -> Result<()> {
    let registry = open_registry(&config).await?;
    let service = GatewayService::new(config, Arc::new(registry))?;

    let shutdown = service.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => warn!(error = %e, "Could not listen for Ctrl+C, shutting down"),
        }
        shutdown.cancel();
    });

    service.start().await?;
    Ok(())
}

/// Key and VK issued by [`register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub key: String,
    pub vk: String,
}

/// Store the identity in `entity_file` and issue a key with the capability
/// manifest in `permissions_file`.
pub async fn register(
    config: &GatewayConfig,
    entity_file: &Path,
    permissions_file: &Path,
) -> Result<Registered> {
    let material = std::fs::read(entity_file)
        .with_context(|| format!("failed to read entity file {}", entity_file.display()))?;
    let raw = std::fs::read(permissions_file).with_context(|| {
        format!("failed to read permissions file {}", permissions_file.display())
    })?;
    let manifest: Manifest = serde_json::from_slice(&raw).with_context(|| {
        format!("failed to parse permissions file {}", permissions_file.display())
    })?;

    let registry = open_registry(config).await?;
    let (key, record) = registry.register(&material, manifest).await?;
    Ok(Registered {
        key,
        vk: record.vk,
    })
}

/// Delete an API key. Returns whether it existed.
pub async fn revoke(config: &GatewayConfig, key: &str) -> Result<bool> {
    let registry = open_registry(config).await?;
    Ok(registry.revoke(key)?)
}

/// Stored identities and issued keys
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub entities: Vec<String>,
    pub keys: Vec<String>,
}

pub async fn list(config: &GatewayConfig) -> Result<Listing> {
    let registry = open_registry(config).await?;
    Ok(Listing {
        entities: registry.entities()?,
        keys: registry.keys()?,
    })
}
