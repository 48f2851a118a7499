//! Shared fixtures for the Kora integration tests.
//!
//! The scenarios under `tests/` drive a real [`LedgerEngine`] over the
//! in-process [`MemoryStore`] (or SQLite in-memory), with the external
//! seams pinned: a settable clock, a gateway that completes every
//! payout, and a static identity directory. [`FlakyStore`] wraps a
//! store and injects failures mid-saga for the rollback scenarios.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p kora-integration-tests
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use kora_ledger::traits::{CheckoutRef, GatewayError};
use kora_ledger::{
    ApplyEntry, Clock, EngineConfig, IdentityDirectory, LedgerEngine, PaymentGateway,
    PayoutOutcome,
};
use kora_store::port::{UserCommit, VersionedReserve, VersionedUser};
use kora_store::{LedgerStore, MemoryStore, Result as StoreResult, StoreError};
use kora_types::{
    AuditLogEntry, Boost, EntryKind, LedgerEntry, ReserveAccount, UserId,
};

/// 2023-11-15T00:00:00Z. UTC-midnight aligned so daily windows start
/// exactly here.
pub const BASE_TIME: u64 = 1_700_006_400;

/// Settable clock shared between a test and its engine.
pub struct TestClock(AtomicU64);

impl TestClock {
    pub fn at(now: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(now)))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Gateway double: every checkout succeeds with a sequential reference
/// and every verification reports the payout completed.
#[derive(Default)]
pub struct CompletingGateway {
    counter: AtomicU64,
}

#[async_trait]
impl PaymentGateway for CompletingGateway {
    async fn initiate_checkout(
        &self,
        _amount: u64,
        _currency: kora_types::Currency,
        metadata: &serde_json::Value,
    ) -> Result<CheckoutRef, GatewayError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let prefix = if metadata.get("withdrawal_id").is_some() {
            "WD"
        } else {
            "SUB"
        };
        Ok(CheckoutRef {
            reference: format!("{prefix}-it-{n}"),
        })
    }

    async fn verify(&self, _reference: &str) -> Result<PayoutOutcome, GatewayError> {
        Ok(PayoutOutcome::Completed)
    }
}

/// Gateway double that is always down.
pub struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn initiate_checkout(
        &self,
        _amount: u64,
        _currency: kora_types::Currency,
        _metadata: &serde_json::Value,
    ) -> Result<CheckoutRef, GatewayError> {
        Err(GatewayError("provider unreachable".to_string()))
    }

    async fn verify(&self, _reference: &str) -> Result<PayoutOutcome, GatewayError> {
        Err(GatewayError("provider unreachable".to_string()))
    }
}

/// Identity directory with a fixed verified set; everyone has the same
/// follower count.
pub struct StaticIdentity {
    verified: HashSet<String>,
    pub followers: u64,
}

impl StaticIdentity {
    pub fn new(verified: &[&str], followers: u64) -> Self {
        Self {
            verified: verified.iter().map(|s| s.to_string()).collect(),
            followers,
        }
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentity {
    async fn is_verified(&self, user_id: &str) -> bool {
        self.verified.contains(user_id)
    }

    async fn follower_count(&self, _user_id: &str) -> u64 {
        self.followers
    }
}

/// Engine over a fresh [`MemoryStore`] with default config, clock pinned
/// at `now`, nobody verified.
pub fn engine(now: u64) -> (LedgerEngine<MemoryStore>, Arc<TestClock>) {
    engine_with(now, EngineConfig::default(), &[])
}

/// Engine over a fresh [`MemoryStore`] with the given config and
/// verified users.
pub fn engine_with(
    now: u64,
    config: EngineConfig,
    verified: &[&str],
) -> (LedgerEngine<MemoryStore>, Arc<TestClock>) {
    engine_over(MemoryStore::new(), now, config, verified)
}

/// Engine over an arbitrary store.
pub fn engine_over<S: LedgerStore>(
    store: S,
    now: u64,
    config: EngineConfig,
    verified: &[&str],
) -> (LedgerEngine<S>, Arc<TestClock>) {
    let clock = TestClock::at(now);
    let engine = LedgerEngine::new(
        store,
        config,
        clock.clone(),
        Arc::new(CompletingGateway::default()),
        Arc::new(StaticIdentity::new(verified, 0)),
    )
    .expect("valid config");
    (engine, clock)
}

/// Credit `amount` SA to a user through an instant admin adjustment.
pub async fn fund<S: LedgerStore>(engine: &LedgerEngine<S>, user_id: &str, amount: i64) {
    engine
        .apply_entry(ApplyEntry {
            user_id: user_id.to_string(),
            kind: EntryKind::AdminAdjustment,
            amount,
            hold_secs: None,
            related_entity_id: None,
            idempotency_key: None,
        })
        .await
        .expect("funding adjustment");
}

/// Store wrapper that injects failures at chosen points. Everything else
/// passes straight through to the inner store.
pub struct FlakyStore {
    inner: MemoryStore,
    blocked_user: std::sync::Mutex<Option<UserId>>,
    /// Fail the next `insert_boost`.
    pub fail_insert_boost: AtomicBool,
    /// Fail every `commit_reserve`.
    pub fail_reserve: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            blocked_user: std::sync::Mutex::new(None),
            fail_insert_boost: AtomicBool::new(false),
            fail_reserve: AtomicBool::new(false),
        }
    }

    /// Fail every `commit_user` for this user until [`unblock_commits`].
    pub fn block_commits_for(&self, user_id: &str) {
        *self.blocked_user.lock().expect("lock") = Some(user_id.to_string());
    }

    pub fn unblock_commits(&self) {
        *self.blocked_user.lock().expect("lock") = None;
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn load_user(&self, user_id: &str) -> StoreResult<Option<VersionedUser>> {
        self.inner.load_user(user_id).await
    }

    async fn commit_user(&self, commit: UserCommit) -> StoreResult<u64> {
        let blocked = self
            .blocked_user
            .lock()
            .expect("lock")
            .as_deref()
            .map(|u| u == commit.user_id)
            .unwrap_or(false);
        if blocked {
            return Err(StoreError::Constraint("injected commit failure".into()));
        }
        self.inner.commit_user(commit).await
    }

    async fn load_reserve(&self) -> StoreResult<VersionedReserve> {
        self.inner.load_reserve().await
    }

    async fn commit_reserve(
        &self,
        reserve: ReserveAccount,
        expected_version: u64,
    ) -> StoreResult<u64> {
        if self.fail_reserve.load(Ordering::SeqCst) {
            return Err(StoreError::Constraint("injected reserve failure".into()));
        }
        self.inner.commit_reserve(reserve, expected_version).await
    }

    async fn insert_boost(&self, boost: &Boost) -> StoreResult<()> {
        if self.fail_insert_boost.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Constraint("injected boost failure".into()));
        }
        self.inner.insert_boost(boost).await
    }

    async fn active_boosts(&self, post_id: &str, now: u64) -> StoreResult<Vec<Boost>> {
        self.inner.active_boosts(post_id, now).await
    }

    async fn find_boost(&self, boost_id: &str) -> StoreResult<Option<Boost>> {
        self.inner.find_boost(boost_id).await
    }

    async fn owner_of_withdrawal(&self, withdrawal_id: &str) -> StoreResult<Option<UserId>> {
        self.inner.owner_of_withdrawal(withdrawal_id).await
    }

    async fn append_audit(
        &self,
        admin_id: &str,
        action: &str,
        detail: &serde_json::Value,
        timestamp: u64,
    ) -> StoreResult<AuditLogEntry> {
        self.inner
            .append_audit(admin_id, action, detail, timestamp)
            .await
    }

    async fn audit_log(&self, limit: u32) -> StoreResult<Vec<AuditLogEntry>> {
        self.inner.audit_log(limit).await
    }

    async fn users_with_maturing_holds(&self, since: u64, until: u64) -> StoreResult<Vec<UserId>> {
        self.inner.users_with_maturing_holds(since, until).await
    }
}

/// The full entry log for a user, oldest first.
pub async fn entries_of<S: LedgerStore>(engine: &LedgerEngine<S>, user_id: &str) -> Vec<LedgerEntry> {
    let mut entries = engine.history(user_id, usize::MAX).await.expect("history");
    entries.reverse();
    entries
}
