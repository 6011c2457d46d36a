//! Capability sets attached to API keys.
//!
//! A record is created once at registration and never edited; revocation
//! deletes it. The owning VK is always filled in by the registry.

use crate::domain::request::Procedure;
use serde::{Deserialize, Serialize};

/// One capability flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    #[serde(default, alias = "Allowed")]
    pub allowed: bool,
}

impl Capability {
    pub const ALLOWED: Self = Self { allowed: true };
    pub const DENIED: Self = Self { allowed: false };
}

/// Capability manifest as uploaded at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, alias = "Subscribe")]
    pub subscribe: Capability,
    #[serde(default, alias = "Publish")]
    pub publish: Capability,
    #[serde(default, alias = "Query")]
    pub query: Capability,
}

impl Manifest {
    /// Every capability granted.
    pub fn all() -> Self {
        Self {
            subscribe: Capability::ALLOWED,
            publish: Capability::ALLOWED,
            query: Capability::ALLOWED,
        }
    }

    /// Only query granted.
    pub fn query_only() -> Self {
        Self {
            query: Capability::ALLOWED,
            ..Self::default()
        }
    }
}

/// Stored permission record for one API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    /// API key this record is stored under
    #[serde(default, alias = "Key")]
    pub key: String,
    /// VK of the entity that owns this key
    #[serde(alias = "VK")]
    pub vk: String,
    #[serde(default, alias = "Subscribe")]
    pub subscribe: Capability,
    #[serde(default, alias = "Publish")]
    pub publish: Capability,
    #[serde(default, alias = "Query")]
    pub query: Capability,
}

impl PermissionRecord {
    /// Bind a manifest to a key and an owning VK.
    pub fn new(key: impl Into<String>, vk: impl Into<String>, manifest: Manifest) -> Self {
        Self {
            key: key.into(),
            vk: vk.into(),
            subscribe: manifest.subscribe,
            publish: manifest.publish,
            query: manifest.query,
        }
    }

    pub fn can_query(&self) -> bool {
        self.query.allowed
    }

    pub fn can_publish(&self) -> bool {
        self.publish.allowed
    }

    pub fn can_subscribe(&self) -> bool {
        self.subscribe.allowed
    }

    /// Capability check for a procedure. `Unknown` is never allowed.
    pub fn allows(&self, procedure: Procedure) -> bool {
        match procedure {
            Procedure::Query => self.can_query(),
            Procedure::Publish => self.can_publish(),
            Procedure::Subscribe => self.can_subscribe(),
            Procedure::Unknown => false,
        }
    }
}
