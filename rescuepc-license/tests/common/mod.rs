//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rescuepc_license::{
    EntitlementResolver, IssuanceConfig, IssuanceObserver, IssuanceService, KeyCodec, LicenseIssued,
    LicenseKey, LicenseRecord, LicenseResult, LicenseStatus, LicenseStore, LicenseType,
    MemoryLicenseStore, PutOutcome, Sale, Validator,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fixed issuance instant used across tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

pub fn days(n: i64) -> Duration {
    Duration::days(n)
}

/// Deterministic CSPRNG for reproducible keys.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Builds an active record with the current rules.
pub fn make_record(key: &str, origin_ref: &str, license_type: LicenseType) -> LicenseRecord {
    let issued_at = t0();
    LicenseRecord {
        key: LicenseKey::parse(key).unwrap(),
        owner_email: "owner@example.com".to_string(),
        license_type,
        issued_at,
        expires_at: EntitlementResolver::new()
            .validity_period_for(license_type)
            .expiry_from(issued_at),
        status: LicenseStatus::Active,
        origin_ref: origin_ref.to_string(),
        assigned_to: None,
        rules_version: 1,
    }
}

pub fn professional_sale(origin_ref: &str) -> Sale {
    Sale::new(origin_ref, "professional", "a@b.com").unwrap()
}

pub fn validator_for(store: Arc<dyn LicenseStore>) -> Validator {
    Validator::new(store, KeyCodec::default(), EntitlementResolver::new())
}

pub fn service_for(
    store: Arc<dyn LicenseStore>,
    observer: Arc<dyn IssuanceObserver>,
) -> IssuanceService {
    IssuanceService::new(store, observer, &IssuanceConfig::default()).unwrap()
}

/// Observer that remembers every notification.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LicenseIssued>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<LicenseIssued> {
        self.events.lock().unwrap().clone()
    }
}

impl IssuanceObserver for RecordingObserver {
    fn license_issued(&self, event: &LicenseIssued) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Store wrapper that counts calls, for asserting which paths touch storage.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryLicenseStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl LicenseStore for CountingStore {
    fn put(&self, record: &LicenseRecord) -> LicenseResult<()> {
        self.tick();
        self.inner.put(record)
    }

    fn put_if_origin_absent(&self, record: &LicenseRecord) -> LicenseResult<PutOutcome> {
        self.tick();
        self.inner.put_if_origin_absent(record)
    }

    fn get(&self, key: &LicenseKey) -> LicenseResult<LicenseRecord> {
        self.tick();
        self.inner.get(key)
    }

    fn find_by_origin(&self, origin_ref: &str) -> LicenseResult<Option<LicenseRecord>> {
        self.tick();
        self.inner.find_by_origin(origin_ref)
    }

    fn set_status(&self, key: &LicenseKey, status: LicenseStatus) -> LicenseResult<LicenseRecord> {
        self.tick();
        self.inner.set_status(key, status)
    }

    fn assign(&self, key: &LicenseKey, assignee: Option<&str>) -> LicenseResult<LicenseRecord> {
        self.tick();
        self.inner.assign(key, assignee)
    }

    fn count(&self) -> LicenseResult<usize> {
        self.tick();
        self.inner.count()
    }
}

/// Store that always reports itself unavailable.
pub struct DownStore;

impl LicenseStore for DownStore {
    fn put(&self, _record: &LicenseRecord) -> LicenseResult<()> {
        Err(down())
    }

    fn put_if_origin_absent(&self, _record: &LicenseRecord) -> LicenseResult<PutOutcome> {
        Err(down())
    }

    fn get(&self, _key: &LicenseKey) -> LicenseResult<LicenseRecord> {
        Err(down())
    }

    fn find_by_origin(&self, _origin_ref: &str) -> LicenseResult<Option<LicenseRecord>> {
        Err(down())
    }

    fn set_status(&self, _key: &LicenseKey, _status: LicenseStatus) -> LicenseResult<LicenseRecord> {
        Err(down())
    }

    fn assign(&self, _key: &LicenseKey, _assignee: Option<&str>) -> LicenseResult<LicenseRecord> {
        Err(down())
    }

    fn count(&self) -> LicenseResult<usize> {
        Err(down())
    }
}

fn down() -> rescuepc_license::LicenseError {
    rescuepc_license::LicenseError::StoreUnavailable("database is locked".to_string())
}

/// Store whose first `collisions` idempotent inserts report a key conflict.
pub struct CollidingStore {
    inner: MemoryLicenseStore,
    remaining: AtomicUsize,
}

impl CollidingStore {
    pub fn new(collisions: usize) -> Self {
        Self {
            inner: MemoryLicenseStore::new(),
            remaining: AtomicUsize::new(collisions),
        }
    }
}

impl LicenseStore for CollidingStore {
    fn put(&self, record: &LicenseRecord) -> LicenseResult<()> {
        self.inner.put(record)
    }

    fn put_if_origin_absent(&self, record: &LicenseRecord) -> LicenseResult<PutOutcome> {
        let collide = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if collide {
            return Err(rescuepc_license::LicenseError::Conflict(format!(
                "key {} already exists",
                record.key
            )));
        }
        self.inner.put_if_origin_absent(record)
    }

    fn get(&self, key: &LicenseKey) -> LicenseResult<LicenseRecord> {
        self.inner.get(key)
    }

    fn find_by_origin(&self, origin_ref: &str) -> LicenseResult<Option<LicenseRecord>> {
        self.inner.find_by_origin(origin_ref)
    }

    fn set_status(&self, key: &LicenseKey, status: LicenseStatus) -> LicenseResult<LicenseRecord> {
        self.inner.set_status(key, status)
    }

    fn assign(&self, key: &LicenseKey, assignee: Option<&str>) -> LicenseResult<LicenseRecord> {
        self.inner.assign(key, assignee)
    }

    fn count(&self) -> LicenseResult<usize> {
        self.inner.count()
    }
}
