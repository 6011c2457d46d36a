//! # Bus Messages
//!
//! A message is what the bus delivers for one publish: the URI it was
//! published on and zero or more payload objects.

use crate::ponum::{PoMask, PoNum};
use bytes::Bytes;

/// A typed unit of data carried by a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadObject {
    ponum: PoNum,
    contents: Bytes,
}

impl PayloadObject {
    /// Create a payload object from a PO number and raw contents.
    pub fn new(ponum: PoNum, contents: impl Into<Bytes>) -> Self {
        Self {
            ponum,
            contents: contents.into(),
        }
    }

    /// The PO number tagging this object.
    #[must_use]
    pub fn ponum(&self) -> PoNum {
        self.ponum
    }

    /// Raw contents.
    #[must_use]
    pub fn contents(&self) -> &Bytes {
        &self.contents
    }

    /// True if this object's PO number falls under `pattern`.
    #[must_use]
    pub fn is_type(&self, pattern: &PoMask) -> bool {
        pattern.matches(self.ponum)
    }

    /// Human readable rendering for payloads with no known decoding.
    #[must_use]
    pub fn text_representation(&self) -> String {
        format!(
            "PO {} len {} ({})",
            self.ponum,
            self.contents.len(),
            hex::encode(&self.contents)
        )
    }
}

/// One delivery from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// URI the message was published on.
    pub uri: String,
    /// VK of the publishing identity.
    pub from: String,
    /// Payload objects in publish order.
    pub payload_objects: Vec<PayloadObject>,
}

impl Message {
    /// Build a message.
    pub fn new(
        uri: impl Into<String>,
        from: impl Into<String>,
        payload_objects: Vec<PayloadObject>,
    ) -> Self {
        Self {
            uri: uri.into(),
            from: from.into(),
            payload_objects,
        }
    }

    /// Payload objects matching an optional descriptor filter (`None` accepts all).
    pub fn matching<'a>(
        &'a self,
        filter: Option<&'a PoMask>,
    ) -> impl Iterator<Item = &'a PayloadObject> + 'a {
        self.payload_objects
            .iter()
            .filter(move |po| filter.map_or(true, |f| po.is_type(f)))
    }
}
