//! SQLite-backed license store.

use chrono::{DateTime, SecondsFormat, Utc};
use rescuepc_license::{
    Expiry, LicenseError, LicenseKey, LicenseRecord, LicenseResult, LicenseStatus, LicenseStore,
    LicenseType, PutOutcome, check_insertable, check_transition,
};
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, ffi, params,
};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How long a statement waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS licenses (
        license_key TEXT PRIMARY KEY,
        owner_email TEXT NOT NULL,
        license_type TEXT NOT NULL,
        issued_at TEXT NOT NULL,
        expires_at TEXT,
        status TEXT NOT NULL CHECK (status IN ('active', 'revoked')),
        origin_ref TEXT NOT NULL UNIQUE,
        assigned_to TEXT,
        rules_version INTEGER NOT NULL
    );
";

const SELECT_COLUMNS: &str = "SELECT license_key, owner_email, license_type, issued_at, \
     expires_at, status, origin_ref, assigned_to, rules_version FROM licenses";

/// Persistent license store backed by SQLite.
pub struct SqliteLicenseStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLicenseStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> LicenseResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| classify("failed to open license store", e))?;
        tracing::info!(path = %path.display(), "opened license store");
        Self::init(conn, busy_timeout)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> LicenseResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| classify("failed to open in-memory license store", e))?;
        Self::init(conn, DEFAULT_BUSY_TIMEOUT)
    }

    fn init(conn: Connection, busy_timeout: Duration) -> LicenseResult<Self> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| classify("failed to set busy timeout", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| classify("failed to init license schema", e))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LicenseError::StoreUnavailable("license store lock poisoned".to_string()))
    }
}

impl LicenseStore for SqliteLicenseStore {
    fn put(&self, record: &LicenseRecord) -> LicenseResult<()> {
        check_insertable(record)?;
        let conn = self.lock()?;
        insert(&conn, record)
    }

    fn put_if_origin_absent(&self, record: &LicenseRecord) -> LicenseResult<PutOutcome> {
        check_insertable(record)?;
        let mut conn = self.lock()?;
        let tx = begin(&mut conn)?;

        if let Some(existing) = select_by_origin(&tx, &record.origin_ref)? {
            commit(tx)?;
            return Ok(PutOutcome::Existing(existing));
        }

        insert(&tx, record)?;
        commit(tx)?;
        Ok(PutOutcome::Inserted)
    }

    fn get(&self, key: &LicenseKey) -> LicenseResult<LicenseRecord> {
        let conn = self.lock()?;
        select_by_key(&conn, key)?.ok_or_else(|| LicenseError::NotFound(key.to_string()))
    }

    fn find_by_origin(&self, origin_ref: &str) -> LicenseResult<Option<LicenseRecord>> {
        let conn = self.lock()?;
        select_by_origin(&conn, origin_ref)
    }

    fn set_status(&self, key: &LicenseKey, status: LicenseStatus) -> LicenseResult<LicenseRecord> {
        let mut conn = self.lock()?;
        let tx = begin(&mut conn)?;

        let mut record =
            select_by_key(&tx, key)?.ok_or_else(|| LicenseError::NotFound(key.to_string()))?;
        check_transition(record.status, status)?;

        if record.status != status {
            tx.execute(
                "UPDATE licenses SET status = ?1 WHERE license_key = ?2",
                params![status.as_str(), key.as_str()],
            )
            .map_err(|e| classify("failed to update license status", e))?;
            record.status = status;
            tracing::info!(%key, %status, "license status changed");
        }

        commit(tx)?;
        Ok(record)
    }

    fn assign(&self, key: &LicenseKey, assignee: Option<&str>) -> LicenseResult<LicenseRecord> {
        let mut conn = self.lock()?;
        let tx = begin(&mut conn)?;

        let mut record =
            select_by_key(&tx, key)?.ok_or_else(|| LicenseError::NotFound(key.to_string()))?;
        if record.is_revoked() {
            return Err(LicenseError::Revoked(key.to_string()));
        }

        tx.execute(
            "UPDATE licenses SET assigned_to = ?1 WHERE license_key = ?2",
            params![assignee, key.as_str()],
        )
        .map_err(|e| classify("failed to assign license", e))?;
        record.assigned_to = assignee.map(str::to_string);
        tracing::info!(%key, assigned_to = ?assignee, "license assignee updated");

        commit(tx)?;
        Ok(record)
    }

    fn count(&self) -> LicenseResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM licenses", [], |row| row.get(0))
            .map_err(|e| classify("failed to count licenses", e))?;
        Ok(count as usize)
    }
}

// ── Statements ───────────────────────────────────────────────────

fn begin(conn: &mut Connection) -> LicenseResult<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| classify("failed to begin transaction", e))
}

fn commit(tx: Transaction<'_>) -> LicenseResult<()> {
    tx.commit()
        .map_err(|e| classify("failed to commit transaction", e))
}

fn insert(conn: &Connection, record: &LicenseRecord) -> LicenseResult<()> {
    conn.execute(
        "INSERT INTO licenses (license_key, owner_email, license_type, issued_at, expires_at, \
         status, origin_ref, assigned_to, rules_version) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.key.as_str(),
            record.owner_email,
            record.license_type.as_str(),
            format_instant(record.issued_at),
            record.expires_at.instant().map(format_instant),
            record.status.as_str(),
            record.origin_ref,
            record.assigned_to,
            i64::from(record.rules_version),
        ],
    )
    .map_err(|e| classify("failed to insert license", e))?;
    Ok(())
}

fn select_by_key(conn: &Connection, key: &LicenseKey) -> LicenseResult<Option<LicenseRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE license_key = ?1"),
        params![key.as_str()],
        RawRow::read,
    )
    .optional()
    .map_err(|e| classify("failed to query license", e))?
    .map(RawRow::decode)
    .transpose()
}

fn select_by_origin(conn: &Connection, origin_ref: &str) -> LicenseResult<Option<LicenseRecord>> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE origin_ref = ?1"),
        params![origin_ref],
        RawRow::read,
    )
    .optional()
    .map_err(|e| classify("failed to query license by origin", e))?
    .map(RawRow::decode)
    .transpose()
}

// ── Row mapping ──────────────────────────────────────────────────

struct RawRow {
    key: String,
    owner_email: String,
    license_type: String,
    issued_at: String,
    expires_at: Option<String>,
    status: String,
    origin_ref: String,
    assigned_to: Option<String>,
    rules_version: i64,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            owner_email: row.get(1)?,
            license_type: row.get(2)?,
            issued_at: row.get(3)?,
            expires_at: row.get(4)?,
            status: row.get(5)?,
            origin_ref: row.get(6)?,
            assigned_to: row.get(7)?,
            rules_version: row.get(8)?,
        })
    }

    fn decode(self) -> LicenseResult<LicenseRecord> {
        let key = LicenseKey::parse(&self.key)
            .map_err(|e| LicenseError::Storage(format!("invalid key in store: {e}")))?;
        let license_type: LicenseType = self.license_type.parse().map_err(|e| {
            tracing::error!(%key, error = %e, "stored license has unknown type");
            LicenseError::Storage(format!("invalid license type for {key}: {e}"))
        })?;
        let expires_at = match self.expires_at {
            Some(raw) => Expiry::At(parse_instant(&raw)?),
            None => Expiry::Never,
        };
        let rules_version = u16::try_from(self.rules_version).map_err(|_| {
            LicenseError::Storage(format!("invalid rules version for {key}: {}", self.rules_version))
        })?;

        Ok(LicenseRecord {
            owner_email: self.owner_email,
            license_type,
            issued_at: parse_instant(&self.issued_at)?,
            expires_at,
            status: LicenseStatus::from_persisted(&self.status)?,
            origin_ref: self.origin_ref,
            assigned_to: self.assigned_to,
            rules_version,
            key,
        })
    }
}

fn format_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_instant(raw: &str) -> LicenseResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LicenseError::Storage(format!("invalid timestamp {raw:?}: {e}")))
}

/// Maps SQLite failures onto the store's error taxonomy.
///
/// Only key and origin uniqueness violations are conflicts; any other
/// constraint failure means the row itself is unfit to store.
fn classify(context: &str, e: rusqlite::Error) -> LicenseError {
    let (code, extended) = match &e {
        rusqlite::Error::SqliteFailure(failure, _) => (Some(failure.code), failure.extended_code),
        _ => (None, 0),
    };

    match code {
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::CannotOpen
            | ErrorCode::DiskFull
            | ErrorCode::OutOfMemory,
        ) => {
            tracing::warn!(error = %e, "{context}");
            LicenseError::StoreUnavailable(format!("{context}: {e}"))
        }
        Some(ErrorCode::ConstraintViolation)
            if extended == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || extended == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            LicenseError::Conflict(format!("{context}: {e}"))
        }
        _ => LicenseError::Storage(format!("{context}: {e}")),
    }
}
