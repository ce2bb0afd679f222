//! Persisted license records and their derived status.

use crate::entitlement::LicenseType;
use crate::error::{LicenseError, LicenseResult};
use crate::key::LicenseKey;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Maximum accepted email length.
pub const MAX_EMAIL_LEN: usize = 254;

/// When a license stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expiry {
    /// Valid until this instant (inclusive).
    At(DateTime<Utc>),
    /// Never expires.
    Never,
}

impl Expiry {
    /// Returns true if `now` is strictly after the expiry instant.
    #[must_use]
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::At(at) => now > *at,
            Self::Never => false,
        }
    }

    /// Returns the expiry instant, or `None` if the license never expires.
    #[must_use]
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(at) => Some(*at),
            Self::Never => None,
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(at) => f.write_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Never => f.write_str("never"),
        }
    }
}

// RFC 3339 instant or the literal "never".
impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "never" {
            return Ok(Self::Never);
        }
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Self::At(dt.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom)
    }
}

/// License status.
///
/// Only `Active` and `Revoked` are ever persisted. `Expired` is computed at
/// read time from the record's expiry and the caller's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// Usable, subject to expiry.
    Active,
    /// Past its expiry (derived, never stored).
    Expired,
    /// Manually revoked. Terminal.
    Revoked,
}

impl LicenseStatus {
    /// Returns the wire identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
        }
    }

    /// Parses a persisted status. `expired` is rejected since it is never stored.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Storage`] for anything but `active` or `revoked`.
    pub fn from_persisted(s: &str) -> LicenseResult<Self> {
        match s {
            "active" => Ok(Self::Active),
            "revoked" => Ok(Self::Revoked),
            other => Err(LicenseError::Storage(format!(
                "invalid persisted status: {other}"
            ))),
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    /// The license key (primary key).
    pub key: LicenseKey,
    /// Purchaser email, normalized.
    pub owner_email: String,
    /// Purchased tier.
    pub license_type: LicenseType,
    /// Issuance instant.
    pub issued_at: DateTime<Utc>,
    /// Fixed at issuance.
    pub expires_at: Expiry,
    /// Persisted status: `Active` or `Revoked`.
    pub status: LicenseStatus,
    /// Reference to the originating sale (unique).
    pub origin_ref: String,
    /// Seat holder for enterprise distribution.
    pub assigned_to: Option<String>,
    /// Entitlement rules version in force at issuance.
    pub rules_version: u16,
}

impl LicenseRecord {
    /// Returns the status as seen at `now`, deriving expiry.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> LicenseStatus {
        match self.status {
            LicenseStatus::Revoked => LicenseStatus::Revoked,
            _ if self.expires_at.is_past(now) => LicenseStatus::Expired,
            _ => LicenseStatus::Active,
        }
    }

    /// Returns true if the record has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.status == LicenseStatus::Revoked
    }
}

/// Validates and normalizes an email address.
///
/// The check is syntactic: one `@`, a non-empty local part, a dotted domain,
/// no whitespace. The result is trimmed and lowercased.
///
/// # Errors
///
/// Returns [`LicenseError::InvalidEmail`] if the address is not acceptable.
pub fn normalize_email(raw: &str) -> LicenseResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.contains(char::is_whitespace) {
        return Err(LicenseError::InvalidEmail(raw.to_string()));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(LicenseError::InvalidEmail(raw.to_string()));
    };

    let domain_ok = domain.contains('.')
        && !domain.contains('@')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");

    if local.is_empty() || !domain_ok {
        return Err(LicenseError::InvalidEmail(raw.to_string()));
    }

    Ok(email)
}
