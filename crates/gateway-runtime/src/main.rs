//! # capgate
//!
//! ```text
//! capgate proxy                               run the gateway
//! capgate register <entity> <permissions>     issue an API key
//! capgate revoke <key>                        delete an API key
//! capgate list                                show identities and keys
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use gateway_runtime::{commands, init_logging, load_config, ConfigArgs};

/// Capability-gated gateway in front of a pub/sub bus
#[derive(Parser, Debug)]
#[command(name = "capgate", version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the gateway
    Proxy,
    /// Store an identity and issue an API key for it
    Register {
        /// Identity material file
        entity: PathBuf,
        /// Capability manifest (JSON)
        permissions: PathBuf,
    },
    /// Delete an API key
    Revoke {
        key: String,
    },
    /// List stored identities and issued keys
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = load_config(&cli.config)?;

    match cli.command {
        Command::Proxy => {
            info!(
                http = %config.http_addr(),
                admin = %config.admin_addr(),
                storage = %config.storage.path.display(),
                agent = %config.bus.agent,
                "Starting capgate v{}",
                api_gateway::VERSION
            );
            commands::proxy(config).await?;
        }
        Command::Register {
            entity,
            permissions,
        } => {
            let registered = commands::register(&config, &entity, &permissions).await?;
            println!("VK is: {}", registered.vk);
            println!("Key is: {}", registered.key);
        }
        Command::Revoke { key } => {
            if commands::revoke(&config, &key).await? {
                println!("Key revoked");
            } else {
                anyhow::bail!("no such key");
            }
        }
        Command::List => {
            let listing = commands::list(&config).await?;
            println!("Entities ({}):", listing.entities.len());
            for vk in &listing.entities {
                println!("  {}", vk);
            }
            println!("Keys ({}):", listing.keys.len());
            for key in &listing.keys {
                println!("  {}", key);
            }
        }
    }

    Ok(())
}
