//! License issuance on confirmed sales.
//!
//! Sale confirmations arrive at least once, so issuance is idempotent by the
//! sale's origin reference: replaying a sale returns the license minted the
//! first time. The check and the insert happen in one atomic store call.

use crate::entitlement::{EntitlementResolver, LicenseType};
use crate::error::{LicenseError, LicenseResult};
use crate::key::{DEFAULT_KEY_PREFIX, KeyCodec};
use crate::record::{Expiry, LicenseRecord, LicenseStatus, normalize_email};
use crate::store::{LicenseStore, PutOutcome};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum accepted origin reference length.
pub const MAX_ORIGIN_REF_LEN: usize = 255;

/// Issuance settings.
#[derive(Debug, Clone)]
pub struct IssuanceConfig {
    /// Literal prefix for generated keys.
    pub key_prefix: String,
    /// Fresh keys to try before giving up on key collisions (default: 8).
    pub max_key_attempts: u32,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.into(),
            max_key_attempts: 8,
        }
    }
}

/// A confirmed, already-authenticated sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    origin_ref: String,
    license_type: LicenseType,
    owner_email: String,
    assigned_to: Option<String>,
}

impl Sale {
    /// Builds a sale from wire values.
    ///
    /// # Errors
    ///
    /// [`LicenseError::InvalidSale`] for an empty or oversized origin
    /// reference, [`LicenseError::UnknownLicenseType`] for unknown types,
    /// [`LicenseError::InvalidEmail`] for a bad owner email.
    pub fn new(origin_ref: &str, license_type: &str, owner_email: &str) -> LicenseResult<Self> {
        let origin_ref = origin_ref.trim();
        if origin_ref.is_empty() {
            return Err(LicenseError::InvalidSale("origin reference is empty".to_string()));
        }
        if origin_ref.len() > MAX_ORIGIN_REF_LEN {
            return Err(LicenseError::InvalidSale(format!(
                "origin reference exceeds {MAX_ORIGIN_REF_LEN} bytes"
            )));
        }

        let license_type = license_type.parse::<LicenseType>().inspect_err(|_| {
            tracing::error!(origin_ref, license_type, "sale carries unknown license type");
        })?;

        Ok(Self {
            origin_ref: origin_ref.to_string(),
            license_type,
            owner_email: normalize_email(owner_email)?,
            assigned_to: None,
        })
    }

    /// Pre-assigns the license to a seat holder.
    #[must_use]
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        let assignee = assignee.into();
        self.assigned_to = (!assignee.trim().is_empty()).then(|| assignee.trim().to_string());
        self
    }

    /// Trimmed reference of the originating sale.
    pub fn origin_ref(&self) -> &str {
        &self.origin_ref
    }

    /// Purchased license type.
    pub fn license_type(&self) -> LicenseType {
        self.license_type
    }

    /// Normalized (lowercase) buyer email.
    pub fn owner_email(&self) -> &str {
        &self.owner_email
    }

    /// Seat holder named at purchase, if any.
    pub fn assigned_to(&self) -> Option<&str> {
        self.assigned_to.as_deref()
    }
}

/// Notification emitted once per freshly issued license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseIssued {
    /// The new license key.
    pub key: String,
    /// Where the key should be emailed.
    pub owner_email: String,
    /// Wire identifier, e.g. `professional`.
    pub license_type: LicenseType,
    /// Customer-facing name, e.g. `Professional License`.
    pub license_name: String,
    /// Issuance instant.
    pub issued_at: DateTime<Utc>,
    /// Derived expiry, or `never`.
    pub expires_at: Expiry,
}

impl From<&LicenseRecord> for LicenseIssued {
    fn from(record: &LicenseRecord) -> Self {
        Self {
            key: record.key.to_string(),
            owner_email: record.owner_email.clone(),
            license_type: record.license_type,
            license_name: record.license_type.display_name().to_string(),
            issued_at: record.issued_at,
            expires_at: record.expires_at,
        }
    }
}

/// Receives issuance notifications (e.g. for email delivery).
///
/// Implementations must not block; delivery happens elsewhere.
pub trait IssuanceObserver: Send + Sync {
    /// Called after a new license has been stored.
    fn license_issued(&self, event: &LicenseIssued);
}

/// Observer that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl IssuanceObserver for NoopObserver {
    fn license_issued(&self, _event: &LicenseIssued) {}
}

/// Creates license records for confirmed sales.
pub struct IssuanceService {
    store: Arc<dyn LicenseStore>,
    codec: KeyCodec,
    resolver: EntitlementResolver,
    observer: Arc<dyn IssuanceObserver>,
    max_key_attempts: u32,
}

impl IssuanceService {
    /// Creates a service.
    ///
    /// # Errors
    ///
    /// [`LicenseError::MalformedFormat`] if the configured key prefix is invalid.
    pub fn new(
        store: Arc<dyn LicenseStore>,
        observer: Arc<dyn IssuanceObserver>,
        config: &IssuanceConfig,
    ) -> LicenseResult<Self> {
        Ok(Self {
            store,
            codec: KeyCodec::new(config.key_prefix.clone())?,
            resolver: EntitlementResolver::new(),
            observer,
            max_key_attempts: config.max_key_attempts.max(1),
        })
    }

    /// Returns the codec used for new keys.
    #[must_use]
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    /// Issues a license for `sale`, or returns the one already issued for it.
    ///
    /// # Errors
    ///
    /// [`LicenseError::StoreUnavailable`] when persistence fails transiently;
    /// the caller should retry the whole call. [`LicenseError::Conflict`] if
    /// every generated key collided.
    pub fn issue(&self, sale: &Sale, now: DateTime<Utc>) -> LicenseResult<LicenseRecord> {
        if let Some(existing) = self.store.find_by_origin(&sale.origin_ref)? {
            return Ok(self.replayed(sale, existing));
        }

        let entitlements = self.resolver.resolve(sale.license_type, self.resolver.version())?;
        let expires_at = entitlements.validity.expiry_from(now);

        for attempt in 1..=self.max_key_attempts {
            let record = LicenseRecord {
                key: self.codec.generate(sale.license_type, &mut OsRng),
                owner_email: sale.owner_email.clone(),
                license_type: sale.license_type,
                issued_at: now,
                expires_at,
                status: LicenseStatus::Active,
                origin_ref: sale.origin_ref.clone(),
                assigned_to: sale.assigned_to.clone(),
                rules_version: entitlements.rules_version,
            };

            match self.store.put_if_origin_absent(&record) {
                Ok(PutOutcome::Inserted) => {
                    tracing::info!(
                        key = %record.key,
                        origin_ref = %record.origin_ref,
                        license_type = %record.license_type,
                        owner_email = %record.owner_email,
                        expires_at = %record.expires_at,
                        "license issued"
                    );
                    self.observer.license_issued(&LicenseIssued::from(&record));
                    return Ok(record);
                }
                Ok(PutOutcome::Existing(existing)) => {
                    return Ok(self.replayed(sale, existing));
                }
                Err(LicenseError::Conflict(reason)) => {
                    tracing::warn!(attempt, %reason, "license key collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        Err(LicenseError::Conflict(format!(
            "no unique key after {} attempts",
            self.max_key_attempts
        )))
    }

    fn replayed(&self, sale: &Sale, existing: LicenseRecord) -> LicenseRecord {
        if existing.license_type != sale.license_type || existing.owner_email != sale.owner_email {
            tracing::warn!(
                origin_ref = %sale.origin_ref,
                stored_type = %existing.license_type,
                sale_type = %sale.license_type,
                "replayed sale differs from stored license, keeping stored license"
            );
        } else {
            tracing::debug!(origin_ref = %sale.origin_ref, key = %existing.key, "sale already issued");
        }
        existing
    }
}
