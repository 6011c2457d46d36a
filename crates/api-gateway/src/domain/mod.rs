//! Domain types for the gateway: configuration, errors, permission records
//! and the request envelope.

pub mod config;
pub mod correlation;
pub mod error;
pub mod permissions;
pub mod request;

// Re-exports for convenience
pub use config::{ConfigError, GatewayConfig};
pub use correlation::CorrelationId;
pub use error::{GatewayError, GatewayResult};
pub use permissions::{Capability, Manifest, PermissionRecord};
pub use request::{Procedure, RpcCall};
