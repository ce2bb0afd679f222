//! License key generation and parsing.
//!
//! Keys use the format: `PREFIX-XXXXXXXX-NNNNNNNNNN`
//!
//! - `PREFIX`: deployment-wide literal, 1-16 uppercase ASCII letters or digits
//! - `XXXXXXXX`: 32 random bits as uppercase hex
//! - `NNNNNNNNNN`: a random integer below 10^10, zero padded
//!
//! Both random blocks come from a cryptographically secure generator so that
//! keys cannot be guessed from issuance order or time. Externally distributed
//! keys must stay parseable forever, so this grammar must not change.

use crate::entitlement::LicenseType;
use crate::error::{LicenseError, LicenseResult};
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "RPC";

/// Maximum prefix length.
pub const MAX_PREFIX_LEN: usize = 16;

/// Length of the hex block.
pub const HEX_BLOCK_LEN: usize = 8;

/// Length of the decimal block.
pub const DIGIT_BLOCK_LEN: usize = 10;

const DIGIT_BLOCK_BOUND: u64 = 10_000_000_000;

/// A syntactically valid license key.
///
/// Holding a `LicenseKey` says nothing about whether the key was ever issued;
/// that is the store's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LicenseKey {
    raw: String,
    prefix_len: usize,
}

impl LicenseKey {
    /// Parses a key with any well-formed prefix.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedFormat`] if the string does not match
    /// the key grammar.
    pub fn parse(raw: &str) -> LicenseResult<Self> {
        let raw = raw.trim();

        let mut parts = raw.split('-');
        let (Some(prefix), Some(hex), Some(digits), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(LicenseError::MalformedFormat(
                "key must have exactly three dash-separated parts".to_string(),
            ));
        };

        validate_prefix(prefix)?;

        if hex.len() != HEX_BLOCK_LEN || !hex.bytes().all(is_upper_hex) {
            return Err(LicenseError::MalformedFormat(format!(
                "second part must be {HEX_BLOCK_LEN} uppercase hex characters"
            )));
        }

        if digits.len() != DIGIT_BLOCK_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LicenseError::MalformedFormat(format!(
                "third part must be {DIGIT_BLOCK_LEN} decimal digits"
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            prefix_len: prefix.len(),
        })
    }

    /// Returns the full key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the literal prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.raw[..self.prefix_len]
    }

    /// Returns the uppercase hex block.
    #[must_use]
    pub fn hex_block(&self) -> &str {
        let start = self.prefix_len + 1;
        &self.raw[start..start + HEX_BLOCK_LEN]
    }

    /// Returns the decimal block.
    #[must_use]
    pub fn digit_block(&self) -> &str {
        &self.raw[self.raw.len() - DIGIT_BLOCK_LEN..]
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for LicenseKey {
    type Err = LicenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for LicenseKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for LicenseKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Generates and parses keys for one deployment prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    /// Creates a codec for the given prefix.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedFormat`] if the prefix is empty, too
    /// long, or contains anything but uppercase ASCII letters and digits.
    pub fn new(prefix: impl Into<String>) -> LicenseResult<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { prefix })
    }

    /// Returns the configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generates a fresh key.
    ///
    /// The key is syntactically valid; global uniqueness is enforced by the
    /// store on insert. The license type does not affect the key material.
    pub fn generate<R: RngCore + CryptoRng>(
        &self,
        license_type: LicenseType,
        rng: &mut R,
    ) -> LicenseKey {
        let hex = rng.next_u32();
        let digits = rng.gen_range(0..DIGIT_BLOCK_BOUND);
        let raw = format!("{}-{hex:08X}-{digits:010}", self.prefix);
        tracing::trace!(%license_type, key = %raw, "generated license key");

        LicenseKey {
            raw,
            prefix_len: self.prefix.len(),
        }
    }

    /// Parses a key and checks it carries this codec's prefix.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedFormat`] if the grammar does not match
    /// or the prefix differs.
    pub fn parse(&self, raw: &str) -> LicenseResult<LicenseKey> {
        let key = LicenseKey::parse(raw)?;
        if key.prefix() != self.prefix {
            return Err(LicenseError::MalformedFormat(format!(
                "expected prefix {}",
                self.prefix
            )));
        }
        Ok(key)
    }
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

fn validate_prefix(prefix: &str) -> LicenseResult<()> {
    if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
        return Err(LicenseError::MalformedFormat(format!(
            "prefix must be 1-{MAX_PREFIX_LEN} characters"
        )));
    }
    if !prefix
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    {
        return Err(LicenseError::MalformedFormat(
            "prefix must be uppercase letters or digits".to_string(),
        ));
    }
    Ok(())
}

fn is_upper_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'A'..=b'F').contains(&b)
}
