//! # Payload Object Numbers
//!
//! Every payload object on the bus is tagged with a 32-bit PO number,
//! usually written in dot form (`2.0.3.1`). Ranges of PO numbers share an
//! encoding; a range is written as a masked descriptor (`2.0.0.0/8`) where
//! the mask is how many leading bits must match.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing PO numbers and descriptor patterns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Empty descriptor string.
    #[error("empty payload descriptor")]
    Empty,

    /// Not a dot form or decimal PO number.
    #[error("malformed payload descriptor: {0}")]
    Malformed(String),

    /// Mask suffix is not an integer in 0..=32.
    #[error("malformed descriptor mask: {0}")]
    InvalidMask(String),
}

/// A 32-bit payload object number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoNum(u32);

impl PoNum {
    /// Wrap a raw PO number.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw 32-bit value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Parse `a.b.c.d` (each octet 0-255) or a plain decimal integer.
    pub fn from_dot_form(s: &str) -> Result<Self, DescriptorError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DescriptorError::Empty);
        }

        if !s.contains('.') {
            return s
                .parse::<u32>()
                .map(Self)
                .map_err(|_| DescriptorError::Malformed(s.to_string()));
        }

        let mut value: u32 = 0;
        let mut octets = 0;
        for part in s.split('.') {
            let octet = part
                .parse::<u8>()
                .map_err(|_| DescriptorError::Malformed(s.to_string()))?;
            value = (value << 8) | u32::from(octet);
            octets += 1;
        }
        if octets != 4 {
            return Err(DescriptorError::Malformed(s.to_string()));
        }
        Ok(Self(value))
    }

    /// Render as `a.b.c.d`.
    #[must_use]
    pub fn dot_form(self) -> String {
        let [a, b, c, d] = self.0.to_be_bytes();
        format!("{}.{}.{}.{}", a, b, c, d)
    }
}

impl fmt::Display for PoNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dot_form())
    }
}

impl FromStr for PoNum {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_dot_form(s)
    }
}

/// A PO number with a mask: how many of its leading bits are significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoMask {
    ponum: PoNum,
    mask: u8,
}

/// Structured-binary payloads (MessagePack).
pub const STRUCTURED_MASK: PoMask = PoMask::new(PoNum::new(0x0200_0000), 8);

/// Plain UTF-8 text payloads.
pub const TEXT_MASK: PoMask = PoMask::new(PoNum::new(0x4000_0000), 4);

impl PoMask {
    /// Full width mask.
    pub const FULL: u8 = 32;

    /// Build a mask. Values above 32 are clamped.
    #[must_use]
    pub const fn new(ponum: PoNum, mask: u8) -> Self {
        let mask = if mask > Self::FULL { Self::FULL } else { mask };
        Self { ponum, mask }
    }

    /// Exact match on a single PO number.
    #[must_use]
    pub const fn exact(ponum: PoNum) -> Self {
        Self::new(ponum, Self::FULL)
    }

    /// Parse `a.b.c.d[/mask]`. Without a suffix the mask is 32.
    pub fn parse(s: &str) -> Result<Self, DescriptorError> {
        let (num, mask) = match s.split_once('/') {
            Some((num, mask)) => {
                let mask = mask
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|m| *m <= Self::FULL)
                    .ok_or_else(|| DescriptorError::InvalidMask(s.to_string()))?;
                (num, mask)
            }
            None => (s, Self::FULL),
        };
        Ok(Self::new(PoNum::from_dot_form(num)?, mask))
    }

    /// The PO number this pattern was written with.
    #[must_use]
    pub const fn ponum(&self) -> PoNum {
        self.ponum
    }

    /// Number of significant leading bits.
    #[must_use]
    pub const fn mask(&self) -> u8 {
        self.mask
    }

    /// True if the top `mask` bits of `ponum` equal this pattern's.
    #[must_use]
    pub fn matches(&self, ponum: PoNum) -> bool {
        if self.mask == 0 {
            return true;
        }
        let shift = u32::from(Self::FULL - self.mask);
        (self.ponum.value() >> shift) == (ponum.value() >> shift)
    }

    /// True if this pattern's PO number falls in `range`. Decides which
    /// encoding a target descriptor requires.
    #[must_use]
    pub fn within(&self, range: &PoMask) -> bool {
        range.matches(self.ponum)
    }
}

impl fmt::Display for PoMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ponum, self.mask)
    }
}

impl FromStr for PoMask {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// String-level convenience: does `ponum` fall under the `pattern` descriptor?
pub fn matches(pattern: &str, ponum: &str) -> Result<bool, DescriptorError> {
    let pattern = PoMask::parse(pattern)?;
    let ponum = PoNum::from_dot_form(ponum)?;
    Ok(pattern.matches(ponum))
}
