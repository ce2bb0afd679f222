//! SQLite storage layer for RescuePC licenses.
//!
//! Provides a durable [`LicenseStore`](rescuepc_license::LicenseStore) backed
//! by a single SQLite file.
//!
//! # Architecture
//!
//! - One `licenses` table; the key is the primary key and the origin
//!   reference carries a unique index
//! - Idempotent inserts run inside an `IMMEDIATE` transaction, so the origin
//!   check and the insert are atomic even across processes sharing the file
//! - Busy/locked/IO failures surface as `StoreUnavailable` once the busy
//!   timeout elapses, instead of blocking

mod license_store;

pub use license_store::{DEFAULT_BUSY_TIMEOUT, SqliteLicenseStore};
