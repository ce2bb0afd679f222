//! License validation.
//!
//! Validation is a read path: for fixed store contents and a fixed `now` the
//! verdict is always the same, and the store is never written. Expiry and
//! revocation are evaluated on every call, so there is nothing to cache.

use crate::entitlement::{EntitlementResolver, Feature, LicenseType};
use crate::error::{LicenseError, LicenseResult};
use crate::key::KeyCodec;
use crate::record::{Expiry, LicenseStatus};
use crate::store::LicenseStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Why a key is not usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// The key does not match the key grammar.
    MalformedFormat,
    /// No license was issued under this key.
    NotFound,
    /// The license was revoked.
    Revoked,
    /// The license is past its expiry.
    Expired,
    /// The license type has no entitlement rules.
    UnknownLicenseType,
}

impl InvalidReason {
    /// Returns the wire identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedFormat => "malformed_format",
            Self::NotFound => "not_found",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::UnknownLicenseType => "unknown_license_type",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a valid key grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Type the license was issued as.
    pub license_type: LicenseType,
    /// Features unlocked under the record's rules version.
    pub features: Vec<Feature>,
    /// Expiry fixed at issuance.
    pub expires_at: Expiry,
    /// Seat allowance; `None` means uncapped.
    pub seats: Option<u32>,
    /// Current seat holder, if assigned.
    pub assigned_to: Option<String>,
}

/// Verdict for a key at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// The key is usable now.
    Valid(Grant),
    /// The key is not usable.
    Invalid(InvalidReason),
}

impl ValidationResult {
    /// Returns true for [`ValidationResult::Valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Returns the rejection reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(reason) => Some(*reason),
        }
    }
}

/// Answers whether a key is usable now, and for what.
#[derive(Clone)]
pub struct Validator {
    store: Arc<dyn LicenseStore>,
    codec: KeyCodec,
    resolver: EntitlementResolver,
}

impl Validator {
    /// Creates a validator over `store`.
    pub fn new(store: Arc<dyn LicenseStore>, codec: KeyCodec, resolver: EntitlementResolver) -> Self {
        Self {
            store,
            codec,
            resolver,
        }
    }

    /// Validates `raw_key` as of `now`.
    ///
    /// Malformed keys are rejected before the store is consulted.
    ///
    /// # Errors
    ///
    /// Only storage failures are errors ([`LicenseError::StoreUnavailable`] or
    /// [`LicenseError::Storage`]); every other outcome is a verdict.
    pub fn validate(&self, raw_key: &str, now: DateTime<Utc>) -> LicenseResult<ValidationResult> {
        let key = match self.codec.parse(raw_key) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!(error = %e, "rejecting malformed key");
                return Ok(ValidationResult::Invalid(InvalidReason::MalformedFormat));
            }
        };

        let record = match self.store.get(&key) {
            Ok(record) => record,
            Err(LicenseError::NotFound(_)) => {
                tracing::debug!(%key, "license not found");
                return Ok(ValidationResult::Invalid(InvalidReason::NotFound));
            }
            Err(e) => return Err(e),
        };

        match record.effective_status(now) {
            LicenseStatus::Revoked => {
                tracing::debug!(%key, "license revoked");
                return Ok(ValidationResult::Invalid(InvalidReason::Revoked));
            }
            LicenseStatus::Expired => {
                tracing::debug!(%key, expires_at = %record.expires_at, "license expired");
                return Ok(ValidationResult::Invalid(InvalidReason::Expired));
            }
            LicenseStatus::Active => {}
        }

        let entitlements = match self
            .resolver
            .resolve(record.license_type, record.rules_version)
        {
            Ok(set) => set,
            Err(e) => {
                tracing::error!(%key, error = %e, "cannot resolve entitlements for stored license");
                return Ok(ValidationResult::Invalid(InvalidReason::UnknownLicenseType));
            }
        };

        Ok(ValidationResult::Valid(Grant {
            license_type: record.license_type,
            features: entitlements.features,
            expires_at: record.expires_at,
            seats: entitlements.seats,
            assigned_to: record.assigned_to,
        }))
    }
}
