//! Error types for the licensing core.

use crate::record::LicenseStatus;
use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The string does not match the license key grammar.
    #[error("malformed license key: {0}")]
    MalformedFormat(String),

    /// License type is not known to the entitlement rules.
    #[error("unknown license type: {0}")]
    UnknownLicenseType(String),

    /// Owner email failed syntax validation.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// Sale event is missing required data.
    #[error("invalid sale: {0}")]
    InvalidSale(String),

    /// No record exists for the key.
    #[error("license not found: {0}")]
    NotFound(String),

    /// A record with the same key or origin reference already exists.
    #[error("license conflict: {0}")]
    Conflict(String),

    /// Status change the store does not permit.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current persisted status.
        from: LicenseStatus,
        /// Requested status.
        to: LicenseStatus,
    },

    /// Operation is not allowed on a revoked license.
    #[error("license has been revoked: {0}")]
    Revoked(String),

    /// Transient storage failure; the operation may be retried.
    #[error("license store unavailable: {0}")]
    StoreUnavailable(String),

    /// Permanent storage fault (corrupt or unreadable data).
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// Returns true if retrying the whole operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
