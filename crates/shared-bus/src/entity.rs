//! # Identity Material
//!
//! An entity is a cryptographic actor on the bus. Its material is a tagged
//! blob: the first byte names the format, the rest is the format payload.
//!
//! Only one format is understood, [`ENTITY_WITH_KEY_TAG`]:
//!
//! ```text
//! ┌─────┬──────────────────────┬──────────────────────┐
//! │ tag │ signing key (32)     │ verifying key (32)   │
//! └─────┴──────────────────────┴──────────────────────┘
//! ```
//!
//! The embedded verifying key must match the one derived from the signing
//! key. The VK is rendered as URL-safe base64 with padding.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use ed25519_dalek::{SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

/// Format tag for an entity carrying its private key.
pub const ENTITY_WITH_KEY_TAG: u8 = 0x32;

/// Payload length for [`ENTITY_WITH_KEY_TAG`].
pub const ENTITY_PAYLOAD_LEN: usize = SECRET_KEY_LENGTH + PUBLIC_KEY_LENGTH;

/// Errors from parsing identity material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// No bytes at all.
    #[error("empty entity material")]
    Empty,

    /// Format tag is not one we understand.
    #[error("unknown entity format tag 0x{0:02x}")]
    UnknownFormat(u8),

    /// Payload has the wrong length.
    #[error("entity payload is {actual} bytes, expected {expected}")]
    BadLength { expected: usize, actual: usize },

    /// Embedded VK does not belong to the signing key.
    #[error("entity verifying key does not match its signing key")]
    KeyMismatch,
}

/// A parsed identity.
#[derive(Clone)]
pub struct Entity {
    signing_key: SigningKey,
}

impl Entity {
    /// Parse tagged material (format tag + payload).
    pub fn from_material(material: &[u8]) -> Result<Self, EntityError> {
        let (&tag, payload) = material.split_first().ok_or(EntityError::Empty)?;
        if tag != ENTITY_WITH_KEY_TAG {
            return Err(EntityError::UnknownFormat(tag));
        }
        Self::from_payload(payload)
    }

    /// Parse an untagged [`ENTITY_WITH_KEY_TAG`] payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, EntityError> {
        if payload.len() != ENTITY_PAYLOAD_LEN {
            return Err(EntityError::BadLength {
                expected: ENTITY_PAYLOAD_LEN,
                actual: payload.len(),
            });
        }

        let (secret, public) = payload.split_at(SECRET_KEY_LENGTH);
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        seed.copy_from_slice(secret);
        let signing_key = SigningKey::from_bytes(&seed);

        if signing_key.verifying_key().as_bytes().as_slice() != public {
            return Err(EntityError::KeyMismatch);
        }

        Ok(Self { signing_key })
    }

    /// Fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// The verifying key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Raw VK bytes.
    #[must_use]
    pub fn vk_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.verifying_key().to_bytes()
    }

    /// VK as URL-safe base64.
    #[must_use]
    pub fn vk(&self) -> String {
        encode_vk(&self.vk_bytes())
    }

    /// Untagged payload (signing key + verifying key).
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENTITY_PAYLOAD_LEN);
        out.extend_from_slice(&self.signing_key.to_bytes());
        out.extend_from_slice(&self.vk_bytes());
        out
    }

    /// Tagged material, as written to an entity file.
    #[must_use]
    pub fn to_material(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + ENTITY_PAYLOAD_LEN);
        out.push(ENTITY_WITH_KEY_TAG);
        out.extend_from_slice(&self.payload());
        out
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity").field("vk", &self.vk()).finish()
    }
}

/// Render raw VK bytes in the bus's string form.
#[must_use]
pub fn encode_vk(vk: &[u8]) -> String {
    URL_SAFE.encode(vk)
}
