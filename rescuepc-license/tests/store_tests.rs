mod common;

use common::make_record;
use rescuepc_license::{
    LicenseError, LicenseKey, LicenseStatus, LicenseStore, LicenseType, MemoryLicenseStore,
    PutOutcome, check_insertable, check_transition,
};
use std::sync::Arc;
use std::thread;

const KEY_A: &str = "RPC-0000000A-0000000001";
const KEY_B: &str = "RPC-0000000B-0000000002";

fn key(raw: &str) -> LicenseKey {
    LicenseKey::parse(raw).unwrap()
}

#[test]
fn put_then_get() {
    let store = MemoryLicenseStore::new();
    let record = make_record(KEY_A, "sale-1", LicenseType::Basic);
    store.put(&record).unwrap();
    assert_eq!(store.get(&key(KEY_A)).unwrap(), record);
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn get_missing_is_not_found() {
    let store = MemoryLicenseStore::new();
    assert!(matches!(store.get(&key(KEY_A)), Err(LicenseError::NotFound(_))));
}

#[test]
fn put_duplicate_key_conflicts() {
    let store = MemoryLicenseStore::new();
    store.put(&make_record(KEY_A, "sale-1", LicenseType::Basic)).unwrap();
    let err = store
        .put(&make_record(KEY_A, "sale-2", LicenseType::Basic))
        .unwrap_err();
    assert!(matches!(err, LicenseError::Conflict(_)));
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn put_duplicate_origin_conflicts() {
    let store = MemoryLicenseStore::new();
    store.put(&make_record(KEY_A, "sale-1", LicenseType::Basic)).unwrap();
    let err = store
        .put(&make_record(KEY_B, "sale-1", LicenseType::Basic))
        .unwrap_err();
    assert!(matches!(err, LicenseError::Conflict(_)));
}

#[test]
fn put_if_origin_absent_returns_existing() {
    let store = MemoryLicenseStore::new();
    let first = make_record(KEY_A, "sale-1", LicenseType::Professional);
    assert_eq!(store.put_if_origin_absent(&first).unwrap(), PutOutcome::Inserted);

    let second = make_record(KEY_B, "sale-1", LicenseType::Professional);
    assert_eq!(
        store.put_if_origin_absent(&second).unwrap(),
        PutOutcome::Existing(first)
    );
    assert_eq!(store.count().unwrap(), 1);
    assert!(matches!(store.get(&key(KEY_B)), Err(LicenseError::NotFound(_))));
}

#[test]
fn put_if_origin_absent_key_collision_conflicts() {
    let store = MemoryLicenseStore::new();
    store.put(&make_record(KEY_A, "sale-1", LicenseType::Basic)).unwrap();
    let err = store
        .put_if_origin_absent(&make_record(KEY_A, "sale-2", LicenseType::Basic))
        .unwrap_err();
    assert!(matches!(err, LicenseError::Conflict(_)));
}

#[test]
fn find_by_origin() {
    let store = MemoryLicenseStore::new();
    let record = make_record(KEY_A, "sale-1", LicenseType::Basic);
    store.put(&record).unwrap();
    assert_eq!(store.find_by_origin("sale-1").unwrap(), Some(record));
    assert_eq!(store.find_by_origin("sale-2").unwrap(), None);
}

#[test]
fn expired_status_is_never_stored() {
    let store = MemoryLicenseStore::new();
    let mut record = make_record(KEY_A, "sale-1", LicenseType::Basic);
    record.status = LicenseStatus::Expired;

    assert!(matches!(
        store.put(&record),
        Err(LicenseError::InvalidTransition { to: LicenseStatus::Expired, .. })
    ));
    assert!(matches!(
        store.put_if_origin_absent(&record),
        Err(LicenseError::InvalidTransition { to: LicenseStatus::Expired, .. })
    ));
    assert_eq!(store.count().unwrap(), 0);
    assert!(matches!(store.get(&key(KEY_A)), Err(LicenseError::NotFound(_))));
}

#[test]
fn insertable_statuses() {
    let mut record = make_record(KEY_A, "sale-1", LicenseType::Basic);
    assert!(check_insertable(&record).is_ok());
    record.status = LicenseStatus::Revoked;
    assert!(check_insertable(&record).is_ok());
    record.status = LicenseStatus::Expired;
    assert!(check_insertable(&record).is_err());
}

// ── Status transitions ───────────────────────────────────────────

#[test]
fn revoke_is_allowed_and_idempotent() {
    let store = MemoryLicenseStore::new();
    store.put(&make_record(KEY_A, "sale-1", LicenseType::Basic)).unwrap();

    let revoked = store.set_status(&key(KEY_A), LicenseStatus::Revoked).unwrap();
    assert_eq!(revoked.status, LicenseStatus::Revoked);
    let again = store.set_status(&key(KEY_A), LicenseStatus::Revoked).unwrap();
    assert_eq!(again.status, LicenseStatus::Revoked);
    assert_eq!(store.get(&key(KEY_A)).unwrap().status, LicenseStatus::Revoked);
}

#[test]
fn setting_active_or_expired_is_rejected() {
    let store = MemoryLicenseStore::new();
    store.put(&make_record(KEY_A, "sale-1", LicenseType::Basic)).unwrap();

    for target in [LicenseStatus::Active, LicenseStatus::Expired] {
        let err = store.set_status(&key(KEY_A), target).unwrap_err();
        assert!(matches!(err, LicenseError::InvalidTransition { to, .. } if to == target));
    }
    assert_eq!(store.get(&key(KEY_A)).unwrap().status, LicenseStatus::Active);
}

#[test]
fn revocation_is_terminal() {
    let store = MemoryLicenseStore::new();
    store.put(&make_record(KEY_A, "sale-1", LicenseType::Basic)).unwrap();
    store.set_status(&key(KEY_A), LicenseStatus::Revoked).unwrap();
    let err = store.set_status(&key(KEY_A), LicenseStatus::Active).unwrap_err();
    assert!(matches!(
        err,
        LicenseError::InvalidTransition {
            from: LicenseStatus::Revoked,
            to: LicenseStatus::Active
        }
    ));
}

#[test]
fn set_status_unknown_key() {
    let store = MemoryLicenseStore::new();
    let err = store.set_status(&key(KEY_A), LicenseStatus::Revoked).unwrap_err();
    assert!(matches!(err, LicenseError::NotFound(_)));
}

#[test]
fn transition_rules() {
    assert!(check_transition(LicenseStatus::Active, LicenseStatus::Revoked).is_ok());
    assert!(check_transition(LicenseStatus::Revoked, LicenseStatus::Revoked).is_ok());
    assert!(check_transition(LicenseStatus::Active, LicenseStatus::Expired).is_err());
    assert!(check_transition(LicenseStatus::Active, LicenseStatus::Active).is_err());
}

// ── Seat assignment ──────────────────────────────────────────────

#[test]
fn assign_and_clear() {
    let store = MemoryLicenseStore::new();
    store.put(&make_record(KEY_A, "sale-1", LicenseType::Enterprise)).unwrap();

    let assigned = store.assign(&key(KEY_A), Some("employee@corp.com")).unwrap();
    assert_eq!(assigned.assigned_to.as_deref(), Some("employee@corp.com"));

    let cleared = store.assign(&key(KEY_A), None).unwrap();
    assert_eq!(cleared.assigned_to, None);
}

#[test]
fn assign_revoked_is_rejected() {
    let store = MemoryLicenseStore::new();
    store.put(&make_record(KEY_A, "sale-1", LicenseType::Enterprise)).unwrap();
    store.set_status(&key(KEY_A), LicenseStatus::Revoked).unwrap();
    let err = store.assign(&key(KEY_A), Some("x@y.com")).unwrap_err();
    assert!(matches!(err, LicenseError::Revoked(_)));
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn concurrent_puts_for_same_key_admit_one() {
    let store = Arc::new(MemoryLicenseStore::new());
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store
                    .put(&make_record(KEY_A, &format!("sale-{i}"), LicenseType::Basic))
                    .is_ok()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn concurrent_idempotent_puts_insert_once() {
    let store = Arc::new(MemoryLicenseStore::new());
    let handles: Vec<_> = (0..16u32)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let raw = format!("RPC-{i:08X}-{i:010}");
                store
                    .put_if_origin_absent(&make_record(&raw, "sale-1", LicenseType::Basic))
                    .unwrap()
            })
        })
        .collect();

    let inserted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|outcome| *outcome == PutOutcome::Inserted)
        .count();
    assert_eq!(inserted, 1);
    assert_eq!(store.count().unwrap(), 1);
}
