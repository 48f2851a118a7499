//! # kora-ledger
//!
//! The ledger engine: every balance mutation in the kora economy goes
//! through here. The engine holds no mutable state of its own; each
//! operation reads a user's versioned document from the store, computes
//! the next state, and writes it back with optimistic concurrency
//! (bounded retry on version conflicts).
//!
//! Balances are derived: available and on-hold are a fold over the
//! user's entries evaluated at `now`, and the stored account row is just
//! a cache that gets revalidated on read. That makes hold release
//! idempotent by construction — there is no released flag to race on.
//!
//! ## Modules
//!
//! - [`engine`] — the [`LedgerEngine`]: entry application, balance
//!   reads, conversion, subscriptions, hold sweep
//! - [`balance`] — entry folding and day-window sums
//! - [`withdrawals`] — request / decide / payout / settle
//! - [`boost`] — boost purchase saga
//! - [`admin`] — reserve adjustments, admin credits, audit log
//! - [`clock`] — time source seam
//! - [`config`] — engine configuration
//! - [`traits`] — payment gateway and identity directory ports

pub mod admin;
pub mod balance;
pub mod boost;
pub mod clock;
pub mod config;
pub mod engine;
pub mod traits;
pub mod withdrawals;

pub use clock::{Clock, SystemClock};
pub use config::EngineConfig;
pub use engine::{ApplyEntry, LedgerEngine, Quote, VerificationEligibility};
pub use traits::{CheckoutRef, IdentityDirectory, PaymentGateway, PayoutOutcome};
pub use withdrawals::WithdrawalDecision;

use kora_store::StoreError;

/// Ledger error types. Everything user-facing carries the fields the
/// daemon needs to build a structured RPC error.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("no account for user {user_id}")]
    AccountNotFound { user_id: String },

    #[error("amount below the minimum withdrawal of {minimum} SA")]
    BelowMinimum { minimum: u64 },

    #[error("daily cap of {cap} SA exceeded ({attempted} attempted)")]
    DailyCapExceeded { cap: u64, attempted: u64 },

    #[error("withdrawal cooldown active for another {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },

    #[error("invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("gave up after {attempts} concurrent-modification retries")]
    ConcurrentModification { attempts: u32 },

    #[error("payment gateway unavailable: {reason}")]
    GatewayUnavailable { reason: String },

    #[error("no withdrawal {withdrawal_id}")]
    WithdrawalNotFound { withdrawal_id: String },

    #[error("withdrawal cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("ledger inconsistency: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
