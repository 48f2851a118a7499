//! # kora-types
//!
//! Shared domain types for the kora ledger workspace.
//!
//! Everything here is plain data: the ledger engine owns all mutation
//! rules, the store owns durability. Amounts are integer SA (the
//! platform's smallest currency unit); timestamps are Unix epoch seconds.

pub mod account;
pub mod audit;
pub mod boost;
pub mod currency;
pub mod entry;
pub mod reserve;
pub mod withdrawal;

pub use account::{Account, SubscriptionTier};
pub use audit::AuditLogEntry;
pub use boost::Boost;
pub use currency::Currency;
pub use entry::{EntryKind, LedgerEntry};
pub use reserve::ReserveAccount;
pub use withdrawal::{Withdrawal, WithdrawalStatus};

/// Common id aliases.
pub type UserId = String;
pub type AdminId = String;
pub type PostId = String;
pub type WithdrawalId = String;
pub type BoostId = String;
pub type EntryId = u64;

/// Seconds per hour.
pub const HOUR_SECS: u64 = 3600;

/// Seconds per UTC day.
pub const DAY_SECS: u64 = 86_400;

/// Error for parsing stored enum strings back into typed values.
#[derive(Debug, thiserror::Error)]
#[error("unknown {what}: {value}")]
pub struct ParseEnumError {
    /// Which enum failed to parse.
    pub what: &'static str,
    /// The offending string.
    pub value: String,
}
