//! License persistence contract and the in-memory implementation.
//!
//! Every backend must make its uniqueness checks atomic with the insert: two
//! concurrent writers for the same key or the same origin reference must
//! never both succeed.

use crate::error::{LicenseError, LicenseResult};
use crate::key::LicenseKey;
use crate::record::{LicenseRecord, LicenseStatus};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Result of an idempotent insert keyed by origin reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was stored.
    Inserted,
    /// A record with the same origin reference already existed; nothing was written.
    Existing(LicenseRecord),
}

/// Durable mapping from license key to license record.
pub trait LicenseStore: Send + Sync {
    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// [`LicenseError::Conflict`] if the key or origin reference is taken,
    /// [`LicenseError::InvalidTransition`] if the record is marked expired.
    fn put(&self, record: &LicenseRecord) -> LicenseResult<()>;

    /// Stores `record` unless a record with the same origin reference exists,
    /// in which case the existing record is returned. Check and insert are
    /// one atomic step.
    ///
    /// # Errors
    ///
    /// [`LicenseError::Conflict`] if the key is taken by a different origin,
    /// [`LicenseError::InvalidTransition`] if the record is marked expired.
    fn put_if_origin_absent(&self, record: &LicenseRecord) -> LicenseResult<PutOutcome>;

    /// Loads a record by key.
    ///
    /// # Errors
    ///
    /// [`LicenseError::NotFound`] if no record has this key.
    fn get(&self, key: &LicenseKey) -> LicenseResult<LicenseRecord>;

    /// Loads the record issued for a sale, if any.
    fn find_by_origin(&self, origin_ref: &str) -> LicenseResult<Option<LicenseRecord>>;

    /// Changes a record's persisted status. Only revocation is permitted;
    /// revoking twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`LicenseError::InvalidTransition`] for any target other than revoked,
    /// [`LicenseError::NotFound`] for unknown keys.
    fn set_status(&self, key: &LicenseKey, status: LicenseStatus) -> LicenseResult<LicenseRecord>;

    /// Sets or clears the seat holder.
    ///
    /// # Errors
    ///
    /// [`LicenseError::Revoked`] on revoked records, [`LicenseError::NotFound`]
    /// for unknown keys.
    fn assign(&self, key: &LicenseKey, assignee: Option<&str>) -> LicenseResult<LicenseRecord>;

    /// Returns the number of stored records.
    fn count(&self) -> LicenseResult<usize>;
}

/// Checks a requested status change against the persisted status.
///
/// Shared by all backends so they agree on the transition rules.
///
/// # Errors
///
/// [`LicenseError::InvalidTransition`] unless `to` is revoked.
pub fn check_transition(from: LicenseStatus, to: LicenseStatus) -> LicenseResult<()> {
    match to {
        LicenseStatus::Revoked => Ok(()),
        LicenseStatus::Active | LicenseStatus::Expired => {
            Err(LicenseError::InvalidTransition { from, to })
        }
    }
}

/// Checks that a new record carries a storable status.
///
/// Expiry is derived from `expires_at`, so only active and revoked records
/// may be written.
///
/// # Errors
///
/// [`LicenseError::InvalidTransition`] for a record marked expired.
pub fn check_insertable(record: &LicenseRecord) -> LicenseResult<()> {
    match record.status {
        LicenseStatus::Active | LicenseStatus::Revoked => Ok(()),
        LicenseStatus::Expired => Err(LicenseError::InvalidTransition {
            from: LicenseStatus::Active,
            to: LicenseStatus::Expired,
        }),
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    by_key: HashMap<LicenseKey, LicenseRecord>,
    by_origin: HashMap<String, LicenseKey>,
}

impl MemoryState {
    fn insert(&mut self, record: &LicenseRecord) -> LicenseResult<()> {
        check_insertable(record)?;
        if self.by_key.contains_key(&record.key) {
            return Err(LicenseError::Conflict(format!(
                "key {} already exists",
                record.key
            )));
        }
        if self.by_origin.contains_key(&record.origin_ref) {
            return Err(LicenseError::Conflict(format!(
                "origin {} already has a license",
                record.origin_ref
            )));
        }
        self.by_origin
            .insert(record.origin_ref.clone(), record.key.clone());
        self.by_key.insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn record_mut(&mut self, key: &LicenseKey) -> LicenseResult<&mut LicenseRecord> {
        self.by_key
            .get_mut(key)
            .ok_or_else(|| LicenseError::NotFound(key.to_string()))
    }
}

/// In-memory store for tests and ephemeral deployments.
///
/// All operations run under a single mutex, which makes every check-and-insert
/// atomic.
#[derive(Debug, Default)]
pub struct MemoryLicenseStore {
    state: Mutex<MemoryState>,
}

impl MemoryLicenseStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LicenseError::StoreUnavailable("memory store lock poisoned".to_string()))
    }
}

impl LicenseStore for MemoryLicenseStore {
    fn put(&self, record: &LicenseRecord) -> LicenseResult<()> {
        self.lock()?.insert(record)
    }

    fn put_if_origin_absent(&self, record: &LicenseRecord) -> LicenseResult<PutOutcome> {
        check_insertable(record)?;
        let mut state = self.lock()?;
        if let Some(key) = state.by_origin.get(&record.origin_ref) {
            let existing = state
                .by_key
                .get(key)
                .cloned()
                .ok_or_else(|| LicenseError::Storage(format!("dangling origin index for {key}")))?;
            return Ok(PutOutcome::Existing(existing));
        }
        state.insert(record)?;
        Ok(PutOutcome::Inserted)
    }

    fn get(&self, key: &LicenseKey) -> LicenseResult<LicenseRecord> {
        self.lock()?
            .by_key
            .get(key)
            .cloned()
            .ok_or_else(|| LicenseError::NotFound(key.to_string()))
    }

    fn find_by_origin(&self, origin_ref: &str) -> LicenseResult<Option<LicenseRecord>> {
        let state = self.lock()?;
        Ok(state
            .by_origin
            .get(origin_ref)
            .and_then(|key| state.by_key.get(key))
            .cloned())
    }

    fn set_status(&self, key: &LicenseKey, status: LicenseStatus) -> LicenseResult<LicenseRecord> {
        let mut state = self.lock()?;
        let record = state.record_mut(key)?;
        check_transition(record.status, status)?;
        record.status = status;
        Ok(record.clone())
    }

    fn assign(&self, key: &LicenseKey, assignee: Option<&str>) -> LicenseResult<LicenseRecord> {
        let mut state = self.lock()?;
        let record = state.record_mut(key)?;
        if record.is_revoked() {
            return Err(LicenseError::Revoked(key.to_string()));
        }
        record.assigned_to = assignee.map(str::to_string);
        Ok(record.clone())
    }

    fn count(&self) -> LicenseResult<usize> {
        Ok(self.lock()?.by_key.len())
    }
}
