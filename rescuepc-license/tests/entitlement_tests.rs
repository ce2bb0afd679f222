mod common;

use chrono::{TimeZone, Utc};
use common::t0;
use pretty_assertions::assert_eq;
use rescuepc_license::{
    CURRENT_RULES_VERSION, EntitlementResolver, Expiry, Feature, LicenseError, LicenseType,
    ValidityPeriod,
};

// ── LicenseType ──────────────────────────────────────────────────

#[test]
fn license_type_parses_wire_names() {
    for t in LicenseType::ALL {
        assert_eq!(t.as_str().parse::<LicenseType>().unwrap(), t);
    }
}

#[test]
fn unknown_license_type_is_an_error() {
    for raw in ["individual", "lifetime_enterprise", "Professional", ""] {
        let err = raw.parse::<LicenseType>().unwrap_err();
        assert!(matches!(err, LicenseError::UnknownLicenseType(_)), "{raw}");
    }
}

#[test]
fn license_type_serde_is_lowercase() {
    let json = serde_json::to_string(&LicenseType::Government).unwrap();
    assert_eq!(json, "\"government\"");
    let parsed: LicenseType = serde_json::from_str("\"unlimited\"").unwrap();
    assert_eq!(parsed, LicenseType::Unlimited);
}

#[test]
fn display_names() {
    assert_eq!(LicenseType::Professional.display_name(), "Professional License");
    assert_eq!(LicenseType::Basic.display_name(), "Basic License");
}

// ── Rules table ──────────────────────────────────────────────────

#[test]
fn professional_features() {
    let resolver = EntitlementResolver::new();
    assert_eq!(
        resolver.features_for(LicenseType::Professional),
        vec![
            Feature::CoreFunctionality,
            Feature::PrioritySupport,
            Feature::Updates2Years,
            Feature::AdvancedFeatures,
            Feature::ApiAccess,
        ]
    );
}

#[test]
fn validity_periods() {
    let resolver = EntitlementResolver::new();
    assert_eq!(resolver.validity_period_for(LicenseType::Basic), ValidityPeriod::Years(1));
    assert_eq!(
        resolver.validity_period_for(LicenseType::Professional),
        ValidityPeriod::Years(2)
    );
    assert_eq!(resolver.validity_period_for(LicenseType::Enterprise), ValidityPeriod::Years(5));
    assert_eq!(resolver.validity_period_for(LicenseType::Government), ValidityPeriod::Years(5));
    assert_eq!(resolver.validity_period_for(LicenseType::Unlimited), ValidityPeriod::Unbounded);
}

#[test]
fn seat_allowances() {
    let resolver = EntitlementResolver::new();
    assert_eq!(resolver.seats_for(LicenseType::Basic), Some(1));
    assert_eq!(resolver.seats_for(LicenseType::Professional), Some(5));
    assert_eq!(resolver.seats_for(LicenseType::Enterprise), Some(25));
    assert_eq!(resolver.seats_for(LicenseType::Government), Some(100));
    assert_eq!(resolver.seats_for(LicenseType::Unlimited), None);
}

#[test]
fn higher_tiers_include_core_functionality() {
    let resolver = EntitlementResolver::new();
    for t in LicenseType::ALL {
        let set = resolver.resolve(t, CURRENT_RULES_VERSION).unwrap();
        assert!(set.grants(Feature::CoreFunctionality), "{t}");
        assert_eq!(set.license_type, t);
        assert_eq!(set.rules_version, CURRENT_RULES_VERSION);
    }
}

#[test]
fn government_extends_enterprise() {
    let resolver = EntitlementResolver::new();
    let enterprise = resolver.features_for(LicenseType::Enterprise);
    let government = resolver.features_for(LicenseType::Government);
    assert!(enterprise.iter().all(|f| government.contains(f)));
    assert!(government.contains(&Feature::ComplianceFeatures));
    assert!(government.contains(&Feature::AuditLogging));
}

#[test]
fn resolution_is_deterministic() {
    let resolver = EntitlementResolver::new();
    let a = resolver.resolve(LicenseType::Enterprise, 1).unwrap();
    let b = resolver.resolve(LicenseType::Enterprise, 1).unwrap();
    assert_eq!(a, b);
}

#[test]
fn unknown_rules_version_is_an_error() {
    let resolver = EntitlementResolver::new();
    let err = resolver.resolve(LicenseType::Basic, 99).unwrap_err();
    assert!(matches!(err, LicenseError::UnknownLicenseType(_)));
}

#[test]
fn resolve_str_never_defaults() {
    let resolver = EntitlementResolver::new();
    assert!(resolver.resolve_str("platinum").is_err());
    assert_eq!(
        resolver.resolve_str("basic").unwrap().license_type,
        LicenseType::Basic
    );
}

#[test]
fn feature_wire_names() {
    let json = serde_json::to_string(&vec![
        Feature::Updates1Year,
        Feature::Updates2Years,
        Feature::Updates5Years,
        Feature::SlaGuarantee,
    ])
    .unwrap();
    assert_eq!(
        json,
        r#"["updates_1_year","updates_2_years","updates_5_years","sla_guarantee"]"#
    );
    assert_eq!(Feature::Updates1Year.as_str(), "updates_1_year");
}

// ── Expiry computation ───────────────────────────────────────────

#[test]
fn years_are_calendar_years() {
    let expiry = ValidityPeriod::Years(2).expiry_from(t0());
    assert_eq!(
        expiry,
        Expiry::At(Utc.with_ymd_and_hms(2027, 1, 15, 12, 0, 0).unwrap())
    );
}

#[test]
fn leap_day_issuance_clamps_to_month_end() {
    let leap = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
    let expiry = ValidityPeriod::Years(1).expiry_from(leap);
    assert_eq!(
        expiry,
        Expiry::At(Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap())
    );
}

#[test]
fn unbounded_never_expires() {
    assert_eq!(ValidityPeriod::Unbounded.expiry_from(t0()), Expiry::Never);
}
