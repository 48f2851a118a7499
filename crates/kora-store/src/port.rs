//! The [`LedgerStore`] port and its commit types.
//!
//! The engine never touches SQL. It reads a user's document at a
//! version, computes the next state in memory, and hands the delta back
//! as a [`UserCommit`]. The store applies the whole commit atomically
//! or rejects it with `VersionConflict`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kora_types::{
    Account, AuditLogEntry, Boost, BoostId, EntryId, LedgerEntry, ReserveAccount, UserId,
    Withdrawal, WithdrawalId, WithdrawalStatus,
};

use crate::Result;

/// Everything the store holds for one user.
///
/// `entries` is append-only and ordered by `entry_id` ascending;
/// `withdrawals` is ordered by `created_at` ascending.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserState {
    pub account: Account,
    pub entries: Vec<LedgerEntry>,
    pub withdrawals: Vec<Withdrawal>,
    pub idempotency: Vec<IdempotencyRecord>,
}

/// A user document read at a point in time.
#[derive(Clone, Debug)]
pub struct VersionedUser {
    /// Write counter for the document. Starts at 1 on creation.
    pub version: u64,
    pub state: UserState,
}

/// The reserve account read at a point in time.
#[derive(Clone, Debug)]
pub struct VersionedReserve {
    pub version: u64,
    pub reserve: ReserveAccount,
}

/// Recorded outcome of an idempotent operation.
///
/// A client retrying with the same key gets the recorded result back
/// instead of a second application.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub entry_id: Option<EntryId>,
    pub boost_id: Option<BoostId>,
    pub created_at: u64,
}

/// Status transition for an existing withdrawal, applied inside a
/// user commit.
#[derive(Clone, Debug)]
pub struct WithdrawalUpdate {
    pub withdrawal_id: WithdrawalId,
    pub status: WithdrawalStatus,
    /// Set on approve/reject; left untouched when `None`.
    pub decided_at: Option<u64>,
    pub decision_reason: Option<String>,
    pub gateway_reference: Option<String>,
}

/// Atomic delta against one user's document.
///
/// `expected_version` is the version the caller read; 0 means the
/// document must not exist yet and the commit creates it.
#[derive(Clone, Debug)]
pub struct UserCommit {
    pub user_id: UserId,
    pub expected_version: u64,
    /// Full replacement for the materialized account row.
    pub account: Account,
    pub new_entries: Vec<LedgerEntry>,
    pub new_withdrawal: Option<Withdrawal>,
    pub withdrawal_update: Option<WithdrawalUpdate>,
    pub new_idempotency: Option<IdempotencyRecord>,
}

/// Storage port for the ledger engine.
///
/// Implementations must apply each commit atomically: either every
/// piece of the delta lands or none of it does.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Snapshot read of one user's document, or `None` if the user has
    /// no account yet.
    async fn load_user(&self, user_id: &str) -> Result<Option<VersionedUser>>;

    /// Apply a delta against a user's document.
    ///
    /// Returns the new version on success. Fails with
    /// [`crate::StoreError::VersionConflict`] when the stored version
    /// no longer matches `expected_version`.
    async fn commit_user(&self, commit: UserCommit) -> Result<u64>;

    /// Snapshot read of the platform reserve account.
    async fn load_reserve(&self) -> Result<VersionedReserve>;

    /// Replace the reserve balances, gated on the version read.
    async fn commit_reserve(&self, reserve: ReserveAccount, expected_version: u64) -> Result<u64>;

    /// Record a new boost. Fails on duplicate `boost_id`.
    async fn insert_boost(&self, boost: &Boost) -> Result<()>;

    /// Boosts on a post that have not expired at `now`, newest first.
    async fn active_boosts(&self, post_id: &str, now: u64) -> Result<Vec<Boost>>;

    /// Look up a boost by id.
    async fn find_boost(&self, boost_id: &str) -> Result<Option<Boost>>;

    /// Owner of a withdrawal, for admin calls that only carry its id.
    async fn owner_of_withdrawal(&self, withdrawal_id: &str) -> Result<Option<UserId>>;

    /// Append an admin action to the audit log. The store assigns the
    /// sequence number.
    async fn append_audit(
        &self,
        admin_id: &str,
        action: &str,
        detail: &serde_json::Value,
        timestamp: u64,
    ) -> Result<AuditLogEntry>;

    /// Most recent audit entries, newest first.
    async fn audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>>;

    /// Users holding positive entries whose `available_at` falls in
    /// `(since, until]`. Drives the background hold sweep.
    async fn users_with_maturing_holds(&self, since: u64, until: u64) -> Result<Vec<UserId>>;
}

#[async_trait]
impl<T: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<T> {
    async fn load_user(&self, user_id: &str) -> Result<Option<VersionedUser>> {
        (**self).load_user(user_id).await
    }

    async fn commit_user(&self, commit: UserCommit) -> Result<u64> {
        (**self).commit_user(commit).await
    }

    async fn load_reserve(&self) -> Result<VersionedReserve> {
        (**self).load_reserve().await
    }

    async fn commit_reserve(&self, reserve: ReserveAccount, expected_version: u64) -> Result<u64> {
        (**self).commit_reserve(reserve, expected_version).await
    }

    async fn insert_boost(&self, boost: &Boost) -> Result<()> {
        (**self).insert_boost(boost).await
    }

    async fn active_boosts(&self, post_id: &str, now: u64) -> Result<Vec<Boost>> {
        (**self).active_boosts(post_id, now).await
    }

    async fn find_boost(&self, boost_id: &str) -> Result<Option<Boost>> {
        (**self).find_boost(boost_id).await
    }

    async fn owner_of_withdrawal(&self, withdrawal_id: &str) -> Result<Option<UserId>> {
        (**self).owner_of_withdrawal(withdrawal_id).await
    }

    async fn append_audit(
        &self,
        admin_id: &str,
        action: &str,
        detail: &serde_json::Value,
        timestamp: u64,
    ) -> Result<AuditLogEntry> {
        (**self).append_audit(admin_id, action, detail, timestamp).await
    }

    async fn audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>> {
        (**self).audit_log(limit).await
    }

    async fn users_with_maturing_holds(&self, since: u64, until: u64) -> Result<Vec<UserId>> {
        (**self).users_with_maturing_holds(since, until).await
    }
}
