//! # kora-store
//!
//! Persistence layer for the Kora ledger daemon.
//! Manages the single SQLite database at `$KORA_DATA_DIR/kora.db`.
//!
//! All engine access goes through the [`LedgerStore`] port. Two
//! implementations ship with the crate:
//! - [`SqliteStore`] — the production store (WAL mode, foreign keys,
//!   schema version in `PRAGMA user_version`)
//! - [`MemoryStore`] — an in-process store for tests
//!
//! Writes are optimistic: every per-user document carries a version
//! counter, and a commit names the version it read. A commit against a
//! stale version fails with [`StoreError::VersionConflict`] and the
//! caller re-reads and retries.

pub mod memory;
pub mod migrations;
pub mod port;
pub mod schema;
pub mod sqlite;

pub use memory::MemoryStore;
pub use port::{
    IdempotencyRecord, LedgerStore, UserCommit, UserState, VersionedReserve, VersionedUser,
    WithdrawalUpdate,
};
pub use sqlite::SqliteStore;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("version conflict: document changed since read")]
    VersionConflict,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
