//! Licensing and entitlements for RescuePC.
//!
//! This crate handles:
//! - License key generation and parsing
//! - Entitlement resolution per license type
//! - Validation of keys against stored licenses
//! - Idempotent issuance on confirmed sales
//!
//! # Design Principles
//!
//! - **Expiry is derived**: a record never transitions to expired in storage;
//!   expiry is computed from `expires_at` and the caller's clock on every read
//! - **Revocation is terminal**: the only persisted status change is to revoked
//! - **Idempotent issuance**: one sale reference yields exactly one license
//! - **Explicit store handle**: persistence sits behind [`LicenseStore`] and is
//!   passed in, never global
//!
//! # License Key Format
//!
//! Keys are formatted as `PREFIX-XXXXXXXX-NNNNNNNNNN`: a literal prefix,
//! 8 uppercase hex characters and 10 decimal digits, all random.

mod entitlement;
mod error;
mod issuance;
mod key;
mod record;
mod store;
mod validator;

pub use entitlement::{
    CURRENT_RULES_VERSION, EntitlementResolver, EntitlementSet, Feature, LicenseType,
    ValidityPeriod,
};
pub use error::{LicenseError, LicenseResult};
pub use issuance::{
    IssuanceConfig, IssuanceObserver, IssuanceService, LicenseIssued, MAX_ORIGIN_REF_LEN,
    NoopObserver, Sale,
};
pub use key::{DEFAULT_KEY_PREFIX, KeyCodec, LicenseKey};
pub use record::{Expiry, LicenseRecord, LicenseStatus, normalize_email};
pub use store::{
    LicenseStore, MemoryLicenseStore, PutOutcome, check_insertable, check_transition,
};
pub use validator::{Grant, InvalidReason, ValidationResult, Validator};
