//! # capgate Runtime
//!
//! Wiring for the `capgate` binary: configuration layering, bus agent
//! selection and the subcommands.
//!
//! ## Startup Sequence (`proxy`)
//!
//! 1. Load configuration (defaults, file, environment, flags) and validate
//! 2. Select the bus agent
//! 3. Lock and open the registry, binding every stored identity
//! 4. Bind the public and admin servers
//! 5. Serve until Ctrl+C

pub mod commands;
pub mod config;

pub use config::{load_config, select_agent, ConfigArgs};

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_logging() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
