//! # Runtime Configuration
//!
//! Layering, lowest to highest precedence:
//!
//! 1. `GatewayConfig::default()`
//! 2. JSON config file (`--config`)
//! 3. `CAPGATE_*` environment variables
//! 4. command-line flags
//!
//! The result is validated before anything is opened or bound.

use anyhow::{bail, Context, Result};
use api_gateway::domain::config::parse_duration;
use api_gateway::GatewayConfig;
use clap::Args;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use shared_bus::{BusAgent, LocalRouter, LOCAL_AGENT_ADDRESS};
use tracing::info;

pub const ENV_HTTP_PORT: &str = "CAPGATE_HTTP_PORT";
pub const ENV_ADMIN_PORT: &str = "CAPGATE_ADMIN_PORT";
pub const ENV_LISTEN_ADDRESS: &str = "CAPGATE_LISTEN_ADDRESS";
pub const ENV_STORAGE_PATH: &str = "CAPGATE_STORAGE_PATH";
pub const ENV_BUS_AGENT: &str = "CAPGATE_BUS_AGENT";
pub const ENV_ADMIN_API_KEY: &str = "CAPGATE_ADMIN_API_KEY";
pub const ENV_CALL_TIMEOUT: &str = "CAPGATE_CALL_TIMEOUT";

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Registry directory
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    /// Bus agent address
    #[arg(long, global = true)]
    pub agent: Option<String>,

    /// Public server port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Admin server port
    #[arg(long, global = true)]
    pub admin_port: Option<u16>,

    /// Address both servers listen on
    #[arg(long, global = true)]
    pub listen_address: Option<IpAddr>,

    /// Do not start the admin server
    #[arg(long, global = true)]
    pub no_admin: bool,

    /// Deadline for single-result calls, e.g. `10s` or `500ms`
    #[arg(long, global = true)]
    pub call_timeout: Option<String>,
}

/// Build the effective configuration from the process environment.
pub fn load_config(args: &ConfigArgs) -> Result<GatewayConfig> {
    load_config_with(args, |name| std::env::var(name).ok())
}

/// Build the effective configuration with `env` as the variable lookup.
pub fn load_config_with(
    args: &ConfigArgs,
    env: impl Fn(&str) -> Option<String>,
) -> Result<GatewayConfig> {
    let mut config = match &args.config {
        Some(path) => read_config_file(path)?,
        None => GatewayConfig::default(),
    };

    apply_env(&mut config, &env)?;
    apply_args(&mut config, args)?;

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<GatewayConfig> {
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    info!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}

fn apply_env(config: &mut GatewayConfig, env: &impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(port) = env(ENV_HTTP_PORT) {
        config.http.port = parse_var(ENV_HTTP_PORT, &port)?;
    }
    if let Some(port) = env(ENV_ADMIN_PORT) {
        config.admin.port = parse_var(ENV_ADMIN_PORT, &port)?;
    }
    if let Some(addr) = env(ENV_LISTEN_ADDRESS) {
        let addr: IpAddr = parse_var(ENV_LISTEN_ADDRESS, &addr)?;
        config.http.host = addr;
        config.admin.host = addr;
    }
    if let Some(path) = env(ENV_STORAGE_PATH) {
        config.storage.path = PathBuf::from(path);
    }
    if let Some(agent) = env(ENV_BUS_AGENT) {
        config.bus.agent = agent;
    }
    if let Some(key) = env(ENV_ADMIN_API_KEY) {
        config.admin.api_key = (!key.is_empty()).then_some(key);
    }
    if let Some(timeout) = env(ENV_CALL_TIMEOUT) {
        config.timeouts.call = parse_duration(&timeout)
            .map_err(|e| anyhow::anyhow!("{}: {}", ENV_CALL_TIMEOUT, e))?;
    }
    Ok(())
}

fn apply_args(config: &mut GatewayConfig, args: &ConfigArgs) -> Result<()> {
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(port) = args.admin_port {
        config.admin.port = port;
    }
    if let Some(addr) = args.listen_address {
        config.http.host = addr;
        config.admin.host = addr;
    }
    if let Some(path) = &args.storage {
        config.storage.path = path.clone();
    }
    if let Some(agent) = &args.agent {
        config.bus.agent = agent.clone();
    }
    if args.no_admin {
        config.admin.enabled = false;
    }
    if let Some(timeout) = &args.call_timeout {
        config.timeouts.call =
            parse_duration(timeout).map_err(|e| anyhow::anyhow!("--call-timeout: {}", e))?;
    }
    Ok(())
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{}={:?}: {}", name, value, e))
}

/// Bus agent for the configured address. Only the in-process router is
/// available; any other address is a configuration error.
pub fn select_agent(config: &GatewayConfig) -> Result<Arc<dyn BusAgent>> {
    if config.bus.agent != LOCAL_AGENT_ADDRESS {
        bail!(
            "unsupported bus agent {:?} (available: {:?})",
            config.bus.agent,
            LOCAL_AGENT_ADDRESS
        );
    }
    let router = LocalRouter::with_capacity(config.bus.channel_capacity);
    Ok(Arc::new(router.agent()))
}
