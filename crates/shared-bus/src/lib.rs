//! # Shared Bus - Pub/Sub Bus Client Interface
//!
//! The gateway never speaks the bus wire protocol itself. Everything it needs
//! from the bus is captured here:
//!
//! - **Payload objects** tagged with a 32-bit PO number (`ponum`)
//! - **Descriptor patterns** (`2.0.0.0/8`) and mask matching
//! - **Identity material** parsing (entity -> verifying key)
//! - **`BusAgent` / `BusConnection`** traits: bind an identity, then
//!   query / publish / subscribe through it
//! - **`LocalRouter`**: an in-process implementation for single-node
//!   deployments and tests
//!
//! ```text
//! ┌──────────────┐   bind(entity)   ┌──────────────┐
//! │   Gateway    │ ───────────────→ │   BusAgent   │
//! │              │                  └──────┬───────┘
//! │              │   query/publish/        │
//! │              │   subscribe             ▼
//! │              │ ←──────────────→ ┌──────────────┐
//! └──────────────┘                  │BusConnection │
//!                                   └──────────────┘
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod connection;
pub mod entity;
pub mod local;
pub mod message;
pub mod ponum;
pub mod uri;

// Re-export main types
pub use connection::{BusAgent, BusConnection, BusError, MessageStream, Subscription};
pub use entity::{encode_vk, Entity, EntityError, ENTITY_WITH_KEY_TAG};
pub use local::{LocalAgent, LocalConnection, LocalRouter, LOCAL_AGENT_ADDRESS};
pub use message::{Message, PayloadObject};
pub use ponum::{DescriptorError, PoMask, PoNum, STRUCTURED_MASK, TEXT_MASK};

/// Maximum messages buffered per subscriber before the slowest one lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
