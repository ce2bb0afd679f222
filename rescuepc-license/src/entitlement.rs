//! License types and the entitlement rules that apply to them.
//!
//! Entitlements are never persisted. A record stores the rules version in
//! force when it was issued and resolves against that version on every read,
//! so changing the table for new sales does not reinterpret old licenses.

use crate::error::{LicenseError, LicenseResult};
use crate::record::Expiry;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rules version applied to new issuances.
pub const CURRENT_RULES_VERSION: u16 = 1;

/// The purchasable license tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// Single-PC license.
    Basic,
    /// Small-team license.
    Professional,
    /// Seat-based business license.
    Enterprise,
    /// Public-sector license with compliance features.
    Government,
    /// Lifetime license with no seat cap.
    Unlimited,
}

impl LicenseType {
    /// All license types, cheapest first.
    pub const ALL: [Self; 5] = [
        Self::Basic,
        Self::Professional,
        Self::Enterprise,
        Self::Government,
        Self::Unlimited,
    ];

    /// Returns the wire identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
            Self::Government => "government",
            Self::Unlimited => "unlimited",
        }
    }

    /// Returns the name shown to customers.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Basic => "Basic License",
            Self::Professional => "Professional License",
            Self::Enterprise => "Enterprise License",
            Self::Government => "Government License",
            Self::Unlimited => "Unlimited License",
        }
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseType {
    type Err = LicenseError;

    /// Parses a wire identifier. Matching is exact; there is no default tier.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LicenseError::UnknownLicenseType(s.to_string()))
    }
}

/// A feature a license can unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// The repair toolkit itself.
    CoreFunctionality,
    /// Email support.
    BasicSupport,
    /// Support with a faster response target.
    PrioritySupport,
    /// A named support contact.
    DedicatedSupport,
    /// Updates for one year.
    #[serde(rename = "updates_1_year")]
    Updates1Year,
    /// Updates for two years.
    #[serde(rename = "updates_2_years")]
    Updates2Years,
    /// Updates for five years.
    #[serde(rename = "updates_5_years")]
    Updates5Years,
    /// Updates for the lifetime of the license.
    LifetimeUpdates,
    /// Advanced diagnostics and repair modules.
    AdvancedFeatures,
    /// Programmatic access.
    ApiAccess,
    /// Custom integration work.
    CustomIntegration,
    /// Contractual service levels.
    SlaGuarantee,
    /// Compliance reporting.
    ComplianceFeatures,
    /// Audit trail of repairs.
    AuditLogging,
    /// No cap on repair count.
    UnlimitedRepairs,
}

impl Feature {
    /// Returns the wire identifier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoreFunctionality => "core_functionality",
            Self::BasicSupport => "basic_support",
            Self::PrioritySupport => "priority_support",
            Self::DedicatedSupport => "dedicated_support",
            Self::Updates1Year => "updates_1_year",
            Self::Updates2Years => "updates_2_years",
            Self::Updates5Years => "updates_5_years",
            Self::LifetimeUpdates => "lifetime_updates",
            Self::AdvancedFeatures => "advanced_features",
            Self::ApiAccess => "api_access",
            Self::CustomIntegration => "custom_integration",
            Self::SlaGuarantee => "sla_guarantee",
            Self::ComplianceFeatures => "compliance_features",
            Self::AuditLogging => "audit_logging",
            Self::UnlimitedRepairs => "unlimited_repairs",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a license stays valid after issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidityPeriod {
    /// Calendar years from the issuance instant.
    Years(u32),
    /// Never expires.
    Unbounded,
}

impl ValidityPeriod {
    /// Computes the expiry for a license issued at `issued_at`.
    #[must_use]
    pub fn expiry_from(&self, issued_at: DateTime<Utc>) -> Expiry {
        match self {
            Self::Years(years) => issued_at
                .checked_add_months(Months::new(years.saturating_mul(12)))
                // Past the representable range; nothing will outlive it.
                .map_or(Expiry::Never, Expiry::At),
            Self::Unbounded => Expiry::Never,
        }
    }
}

/// Everything a license type grants under one rules version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSet {
    /// The license type these rules apply to.
    pub license_type: LicenseType,
    /// Rules version that produced this set.
    pub rules_version: u16,
    /// Granted features, in display order.
    pub features: Vec<Feature>,
    /// Validity window from issuance.
    pub validity: ValidityPeriod,
    /// Number of seats, or `None` for no cap.
    pub seats: Option<u32>,
}

impl EntitlementSet {
    /// Returns true if the set grants `feature`.
    #[must_use]
    pub fn grants(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }
}

/// Resolves license types to entitlements.
///
/// Resolution is pure and deterministic. Unknown types or rules versions are
/// errors, never a fallback tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementResolver {
    version: u16,
}

impl EntitlementResolver {
    /// Creates a resolver that issues under the current rules.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: CURRENT_RULES_VERSION,
        }
    }

    /// Returns the rules version stamped on new issuances.
    #[must_use]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Returns the features for `license_type` under the current rules.
    #[must_use]
    pub fn features_for(&self, license_type: LicenseType) -> Vec<Feature> {
        rules_v1(license_type).features
    }

    /// Returns the validity period for `license_type` under the current rules.
    #[must_use]
    pub fn validity_period_for(&self, license_type: LicenseType) -> ValidityPeriod {
        rules_v1(license_type).validity
    }

    /// Returns the seat allowance for `license_type` under the current rules.
    #[must_use]
    pub fn seats_for(&self, license_type: LicenseType) -> Option<u32> {
        rules_v1(license_type).seats
    }

    /// Resolves the full entitlement set under a specific rules version.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::UnknownLicenseType`] if no rules table exists
    /// for `rules_version`.
    pub fn resolve(
        &self,
        license_type: LicenseType,
        rules_version: u16,
    ) -> LicenseResult<EntitlementSet> {
        match rules_version {
            1 => Ok(rules_v1(license_type)),
            other => {
                tracing::error!(
                    %license_type,
                    rules_version = other,
                    "no entitlement rules for version"
                );
                Err(LicenseError::UnknownLicenseType(format!(
                    "{license_type} under rules version {other}"
                )))
            }
        }
    }

    /// Resolves a license type given as a wire string.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::UnknownLicenseType`] for unrecognised types.
    pub fn resolve_str(&self, license_type: &str) -> LicenseResult<EntitlementSet> {
        let license_type = license_type.parse::<LicenseType>().inspect_err(|_| {
            tracing::error!(license_type, "unknown license type");
        })?;
        self.resolve(license_type, self.version)
    }
}

impl Default for EntitlementResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn rules_v1(license_type: LicenseType) -> EntitlementSet {
    use Feature::*;

    let (features, validity, seats) = match license_type {
        LicenseType::Basic => (
            vec![CoreFunctionality, BasicSupport, Updates1Year],
            ValidityPeriod::Years(1),
            Some(1),
        ),
        LicenseType::Professional => (
            vec![
                CoreFunctionality,
                PrioritySupport,
                Updates2Years,
                AdvancedFeatures,
                ApiAccess,
            ],
            ValidityPeriod::Years(2),
            Some(5),
        ),
        LicenseType::Enterprise => (
            vec![
                CoreFunctionality,
                DedicatedSupport,
                Updates5Years,
                AdvancedFeatures,
                ApiAccess,
                CustomIntegration,
                SlaGuarantee,
            ],
            ValidityPeriod::Years(5),
            Some(25),
        ),
        LicenseType::Government => (
            vec![
                CoreFunctionality,
                DedicatedSupport,
                Updates5Years,
                AdvancedFeatures,
                ApiAccess,
                CustomIntegration,
                SlaGuarantee,
                ComplianceFeatures,
                AuditLogging,
            ],
            ValidityPeriod::Years(5),
            Some(100),
        ),
        LicenseType::Unlimited => (
            vec![
                CoreFunctionality,
                DedicatedSupport,
                LifetimeUpdates,
                AdvancedFeatures,
                ApiAccess,
                CustomIntegration,
                SlaGuarantee,
                ComplianceFeatures,
                AuditLogging,
                UnlimitedRepairs,
            ],
            ValidityPeriod::Unbounded,
            None,
        ),
    };

    EntitlementSet {
        license_type,
        rules_version: 1,
        features,
        validity,
        seats,
    }
}
