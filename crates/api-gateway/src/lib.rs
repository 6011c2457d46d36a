#![allow(missing_docs)]

//! Capability-gated HTTP/WebSocket gateway in front of a pub/sub bus.
//!
//! Clients never hold a bus identity. They hold an opaque API key that
//! maps to one identity's live bus connection and to a capability set
//! (query, publish, subscribe).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           api-gateway                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────┐        ┌────────────────────┐       │
//! │  │  public  (2222)          │        │  admin  (2223)     │       │
//! │  │  POST /call              │        │  register / revoke │       │
//! │  │  GET  /streaming (ws)    │        │  entities/metrics  │       │
//! │  └────────────┬─────────────┘        └─────────┬──────────┘       │
//! │               │                                │                  │
//! │  ┌────────────┴────────────────────────────────┴──────────┐       │
//! │  │  Registry   key → PermissionRecord → BusConnection      │       │
//! │  │             (RocksDB + fs2 lock + connection cache)     │       │
//! │  └────────────┬────────────────────────────────────────────┘      │
//! │               │                                                   │
//! │  ┌────────────┴───────────────┐   ┌──────────────────────┐        │
//! │  │  Dispatcher                │──→│  Codec msgpack/text  │        │
//! │  │  capability check, ctx     │   │  ↔ JSON              │        │
//! │  └────────────┬───────────────┘   └──────────────────────┘        │
//! └───────────────┼───────────────────────────────────────────────────┘
//!                 │
//!          shared-bus (BusAgent / BusConnection)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use api_gateway::{GatewayConfig, GatewayService, Registry};
//!
//! let config = GatewayConfig::default();
//! let registry = Registry::open(&config.storage.path, true, agent).await?;
//! let service = GatewayService::new(config, Arc::new(registry))?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod admin;
pub mod codec;
pub mod dispatch;
pub mod domain;
pub mod middleware;
pub mod registry;
pub mod service;
pub mod ws;

// Re-exports for public API
pub use admin::{RegisterRequest, RegisterResponse};
pub use dispatch::{dispatch_call, dispatch_stream, CallContext, StreamHandle};
pub use domain::{
    Capability, ConfigError, CorrelationId, GatewayConfig, GatewayError, GatewayResult, Manifest,
    PermissionRecord, Procedure, RpcCall,
};
pub use middleware::GatewayMetrics;
pub use registry::{generate_api_key, key_fingerprint, Registry};
pub use service::{AppState, GatewayService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
