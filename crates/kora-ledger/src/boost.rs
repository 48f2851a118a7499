//! Boost purchase saga.
//!
//! A boost spans three documents (booster, creator, reserve) plus the
//! boost record, and the store only guarantees atomicity per document.
//! The purchase therefore runs as a saga: charge the booster first, then
//! distribute, and write the boost record only once every credit landed.
//! If any later step fails, compensating entries undo what was applied,
//! so a failed purchase never leaves a charged booster or an unfunded
//! promotion behind.

use kora_policy::splits;
use kora_store::{IdempotencyRecord, LedgerStore};
use kora_types::{Boost, EntryKind, LedgerEntry};

use crate::balance;
use crate::engine::{next_entry_id, random_id, store_balances, LedgerEngine, Step, UserPlan};
use crate::{LedgerError, Result};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Buy a boost for `post_id`, paying its creator and the platform
    /// reserve out of the configured cost.
    ///
    /// The creator credit is instantly available. With an
    /// `idempotency_key`, a retry after an unknown-outcome timeout
    /// returns the recorded boost instead of charging again.
    pub async fn boost_post(
        &self,
        booster_user_id: &str,
        post_id: &str,
        creator_user_id: &str,
        idempotency_key: Option<String>,
    ) -> Result<Boost> {
        let cost = self.config.boost_cost;
        let cost_signed = i64::try_from(cost).map_err(|_| LedgerError::InvalidAmount {
            reason: "boost cost too large".to_string(),
        })?;
        let (creator_amount, platform_amount, reserve_amount) =
            splits::distribute(cost, &self.config.split).map_err(|e| {
                // Unreachable with a validated config; surfaced for
                // completeness.
                LedgerError::Config(e.to_string())
            })?;
        let boost_id = random_id("boost");

        // Step 1: charge the booster. Records the boost id under the
        // idempotency key so a replayed call can find the outcome.
        let charge = self
            .run_user_commit(booster_user_id, |loaded, now| {
                if let (Some(key), Some(doc)) = (&idempotency_key, loaded) {
                    if let Some(record) = doc.state.idempotency.iter().find(|r| r.key == *key) {
                        let boost_id = record.boost_id.clone().ok_or_else(|| {
                            LedgerError::Inconsistent(format!(
                                "idempotency key {key} has no recorded boost"
                            ))
                        })?;
                        return Ok(Step::Done(ChargeOutcome::Replayed(boost_id)));
                    }
                }

                let doc = loaded.ok_or_else(|| LedgerError::AccountNotFound {
                    user_id: booster_user_id.to_string(),
                })?;
                let entries = doc.state.entries.as_slice();

                let current = balance::derive_balances(entries, now)?;
                if current.available < cost {
                    return Err(LedgerError::InsufficientFunds {
                        required: cost,
                        available: current.available,
                    });
                }

                let debit = LedgerEntry {
                    entry_id: next_entry_id(entries),
                    user_id: booster_user_id.to_string(),
                    kind: EntryKind::BoostCost,
                    amount: -cost_signed,
                    created_at: now,
                    available_at: now,
                    related_entity_id: Some(boost_id.clone()),
                    reversal_of: None,
                };
                let balances =
                    balance::derive_balances(entries.iter().chain(std::iter::once(&debit)), now)?;
                let mut account = doc.state.account.clone();
                store_balances(&mut account, balances);

                let mut plan = UserPlan::new(account);
                if let Some(key) = &idempotency_key {
                    plan.new_idempotency = Some(IdempotencyRecord {
                        key: key.clone(),
                        entry_id: Some(debit.entry_id),
                        boost_id: Some(boost_id.clone()),
                        created_at: now,
                    });
                }
                let outcome = ChargeOutcome::Charged {
                    debit_entry_id: debit.entry_id,
                    now,
                };
                plan.new_entries.push(debit);
                Ok(Step::Commit(plan, outcome))
            })
            .await?;

        let (debit_entry_id, now) = match charge {
            ChargeOutcome::Replayed(recorded_id) => {
                return self
                    .store
                    .find_boost(&recorded_id)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::Inconsistent(format!(
                            "boost {recorded_id} missing for replayed purchase"
                        ))
                    });
            }
            ChargeOutcome::Charged {
                debit_entry_id,
                now,
            } => (debit_entry_id, now),
        };

        // Steps 2-4 past the charge; any failure refunds the booster
        // before the error is surfaced.
        let boost = Boost {
            boost_id: boost_id.clone(),
            post_id: post_id.to_string(),
            booster_user_id: booster_user_id.to_string(),
            creator_user_id: creator_user_id.to_string(),
            cost,
            created_at: now,
            expires_at: now + self.config.boost_duration_secs,
        };
        if let Err(e) = self.distribute_boost(&boost, creator_amount, reserve_amount + platform_amount).await {
            tracing::warn!(
                boost_id = %boost_id,
                error = %e,
                "boost distribution failed, refunding booster"
            );
            self.compensate_charge(booster_user_id, cost_signed, debit_entry_id, &boost_id)
                .await?;
            return Err(e);
        }

        tracing::info!(
            boost_id = %boost_id,
            booster = booster_user_id,
            creator = creator_user_id,
            cost,
            creator_amount,
            reserve_amount = reserve_amount + platform_amount,
            "boost purchased"
        );
        Ok(boost)
    }

    /// Unexpired boosts promoting a post, newest first.
    pub async fn active_boosts(&self, post_id: &str) -> Result<Vec<Boost>> {
        Ok(self.store.active_boosts(post_id, self.clock.now()).await?)
    }

    /// Credit the creator and the reserve, then persist the boost
    /// record. The record goes last so a compensated purchase never
    /// leaves an active promotion.
    async fn distribute_boost(
        &self,
        boost: &Boost,
        creator_amount: u64,
        reserve_share: u64,
    ) -> Result<()> {
        let creator_signed =
            i64::try_from(creator_amount).map_err(|_| LedgerError::InvalidAmount {
                reason: "creator share too large".to_string(),
            })?;

        if creator_amount > 0 {
            self.run_user_commit(&boost.creator_user_id, |loaded, now| {
                let mut account = match loaded {
                    Some(doc) => doc.state.account.clone(),
                    None => kora_types::Account::new(boost.creator_user_id.clone(), now),
                };
                let entries: &[LedgerEntry] =
                    loaded.map_or(&[], |doc| doc.state.entries.as_slice());

                let earn = LedgerEntry {
                    entry_id: next_entry_id(entries),
                    user_id: boost.creator_user_id.clone(),
                    kind: EntryKind::BoostEarn,
                    amount: creator_signed,
                    created_at: now,
                    available_at: now,
                    related_entity_id: Some(boost.boost_id.clone()),
                    reversal_of: None,
                };
                let balances =
                    balance::derive_balances(entries.iter().chain(std::iter::once(&earn)), now)?;
                store_balances(&mut account, balances);

                let mut plan = UserPlan::new(account);
                plan.new_entries.push(earn);
                Ok(Step::Commit(plan, ()))
            })
            .await?;
        }

        if let Err(e) = self.credit_reserve(reserve_share).await {
            self.reverse_creator_credit(boost, creator_signed).await;
            return Err(e);
        }

        if let Err(e) = self.store.insert_boost(boost).await {
            if let Err(undo) = self.debit_reserve_compensation(reserve_share).await {
                tracing::error!(
                    boost_id = %boost.boost_id,
                    error = %undo,
                    "failed to undo reserve credit"
                );
            }
            self.reverse_creator_credit(boost, creator_signed).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn credit_reserve(&self, amount: u64) -> Result<()> {
        self.run_reserve_commit(|reserve| {
            let mut next = reserve.clone();
            next.total_balance = next
                .total_balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::Inconsistent("reserve overflow".to_string()))?;
            next.available_balance = next
                .available_balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::Inconsistent("reserve overflow".to_string()))?;
            Ok(next)
        })
        .await?;
        Ok(())
    }

    async fn debit_reserve_compensation(&self, amount: u64) -> Result<()> {
        self.run_reserve_commit(|reserve| {
            let mut next = reserve.clone();
            next.total_balance = next.total_balance.saturating_sub(amount);
            next.available_balance = next.available_balance.saturating_sub(amount);
            Ok(next)
        })
        .await?;
        Ok(())
    }

    /// Best-effort reversal of an already-applied creator credit.
    async fn reverse_creator_credit(&self, boost: &Boost, creator_signed: i64) {
        if creator_signed == 0 {
            return;
        }
        let result = self
            .run_user_commit(&boost.creator_user_id, |loaded, now| {
                let doc = loaded.ok_or_else(|| LedgerError::AccountNotFound {
                    user_id: boost.creator_user_id.clone(),
                })?;
                let entries = doc.state.entries.as_slice();
                let original = entries
                    .iter()
                    .find(|e| {
                        e.kind == EntryKind::BoostEarn
                            && e.related_entity_id.as_deref() == Some(boost.boost_id.as_str())
                            && e.amount > 0
                    })
                    .map(|e| e.entry_id);

                let reversal = LedgerEntry {
                    entry_id: next_entry_id(entries),
                    user_id: boost.creator_user_id.clone(),
                    kind: EntryKind::BoostEarn,
                    amount: -creator_signed,
                    created_at: now,
                    available_at: now,
                    related_entity_id: Some(boost.boost_id.clone()),
                    reversal_of: original,
                };
                let balances = balance::derive_balances(
                    entries.iter().chain(std::iter::once(&reversal)),
                    now,
                )?;
                let mut account = doc.state.account.clone();
                store_balances(&mut account, balances);

                let mut plan = UserPlan::new(account);
                plan.new_entries.push(reversal);
                Ok(Step::Commit(plan, ()))
            })
            .await;
        if let Err(e) = result {
            tracing::error!(
                boost_id = %boost.boost_id,
                creator = %boost.creator_user_id,
                error = %e,
                "failed to reverse creator credit"
            );
        }
    }

    /// Refund the booster with a reversing cost entry.
    async fn compensate_charge(
        &self,
        booster_user_id: &str,
        cost_signed: i64,
        debit_entry_id: u64,
        boost_id: &str,
    ) -> Result<()> {
        self.run_user_commit(booster_user_id, |loaded, now| {
            let doc = loaded.ok_or_else(|| LedgerError::AccountNotFound {
                user_id: booster_user_id.to_string(),
            })?;
            let entries = doc.state.entries.as_slice();

            let refund = LedgerEntry {
                entry_id: next_entry_id(entries),
                user_id: booster_user_id.to_string(),
                kind: EntryKind::BoostCost,
                amount: cost_signed,
                created_at: now,
                available_at: now,
                related_entity_id: Some(boost_id.to_string()),
                reversal_of: Some(debit_entry_id),
            };
            let balances =
                balance::derive_balances(entries.iter().chain(std::iter::once(&refund)), now)?;
            let mut account = doc.state.account.clone();
            store_balances(&mut account, balances);

            let mut plan = UserPlan::new(account);
            plan.new_entries.push(refund);
            Ok(Step::Commit(plan, ()))
        })
        .await?;
        Ok(())
    }
}

/// Result of the charge step.
enum ChargeOutcome {
    /// Idempotency key already recorded; the boost exists.
    Replayed(String),
    Charged {
        debit_entry_id: u64,
        now: u64,
    },
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::engine::testutil::*;
    use crate::engine::ApplyEntry;
    use crate::EngineConfig;
    use kora_store::{
        MemoryStore, UserCommit, VersionedReserve, VersionedUser,
    };
    use kora_types::{AuditLogEntry, ReserveAccount, UserId};

    const BASE: u64 = 1_700_006_400;

    async fn fund(engine: &crate::LedgerEngine<impl LedgerStore>, user_id: &str, amount: i64) {
        engine
            .apply_entry(ApplyEntry {
                user_id: user_id.to_string(),
                kind: kora_types::EntryKind::AdminAdjustment,
                amount,
                hold_secs: None,
                related_entity_id: None,
                idempotency_key: None,
            })
            .await
            .expect("fund");
    }

    #[tokio::test]
    async fn test_boost_distributes_50_30_20() {
        let (engine, _clock) = engine_at(BASE);
        fund(&engine, "booster", 1_000).await;

        let boost = engine
            .boost_post("booster", "post-1", "creator", None)
            .await
            .expect("boost");
        assert_eq!(boost.cost, 100);
        assert_eq!(boost.expires_at, BASE + 24 * 3_600);

        let booster = engine.balance_of("booster").await.expect("balance");
        assert_eq!(booster.total_balance, 900);
        assert_eq!(booster.available_balance, 900);

        // Creator gains 50, instantly available.
        let creator = engine.balance_of("creator").await.expect("balance");
        assert_eq!(creator.total_balance, 50);
        assert_eq!(creator.available_balance, 50);

        // Reserve gains platform + reserve shares.
        let reserve = engine.reserve_balance().await.expect("reserve");
        assert_eq!(reserve.total_balance, 50);
        assert!(reserve.balanced());
    }

    #[tokio::test]
    async fn test_boost_needs_available_funds() {
        let (engine, _clock) = engine_at(BASE);
        fund(&engine, "booster", 99).await;

        let err = engine
            .boost_post("booster", "post-1", "creator", None)
            .await
            .expect_err("underfunded");
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                required: 100,
                available: 99
            }
        ));
    }

    #[tokio::test]
    async fn test_active_boosts_expire() {
        let (engine, clock) = engine_at(BASE);
        fund(&engine, "booster", 1_000).await;
        engine
            .boost_post("booster", "post-1", "creator", None)
            .await
            .expect("boost");

        assert_eq!(engine.active_boosts("post-1").await.expect("active").len(), 1);
        assert!(engine.active_boosts("post-2").await.expect("other").is_empty());

        clock.advance(24 * 3_600 + 1);
        assert!(engine.active_boosts("post-1").await.expect("expired").is_empty());
    }

    #[tokio::test]
    async fn test_idempotent_replay_returns_same_boost() {
        let (engine, _clock) = engine_at(BASE);
        fund(&engine, "booster", 1_000).await;

        let key = Some("req-42".to_string());
        let first = engine
            .boost_post("booster", "post-1", "creator", key.clone())
            .await
            .expect("first");
        let replay = engine
            .boost_post("booster", "post-1", "creator", key)
            .await
            .expect("replay");
        assert_eq!(first, replay);

        let booster = engine.balance_of("booster").await.expect("balance");
        assert_eq!(booster.total_balance, 900, "charged once");
    }

    /// Store double that fails a chosen step of the saga.
    struct FailingStore {
        inner: MemoryStore,
        /// Fail creator-credit commits (any commit for this user).
        fail_commits_for: Option<UserId>,
        /// Fail `insert_boost`.
        fail_insert_boost: bool,
        /// Fail reserve commits.
        fail_reserve: bool,
        commits: AtomicU32,
    }

    impl FailingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                fail_commits_for: None,
                fail_insert_boost: false,
                fail_reserve: false,
                commits: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LedgerStore for FailingStore {
        async fn load_user(&self, user_id: &str) -> kora_store::Result<Option<VersionedUser>> {
            self.inner.load_user(user_id).await
        }

        async fn commit_user(&self, commit: UserCommit) -> kora_store::Result<u64> {
            if self.fail_commits_for.as_deref() == Some(commit.user_id.as_str()) {
                return Err(kora_store::StoreError::Constraint(
                    "injected commit failure".to_string(),
                ));
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            self.inner.commit_user(commit).await
        }

        async fn load_reserve(&self) -> kora_store::Result<VersionedReserve> {
            self.inner.load_reserve().await
        }

        async fn commit_reserve(
            &self,
            reserve: ReserveAccount,
            expected_version: u64,
        ) -> kora_store::Result<u64> {
            if self.fail_reserve {
                return Err(kora_store::StoreError::Constraint(
                    "injected reserve failure".to_string(),
                ));
            }
            self.inner.commit_reserve(reserve, expected_version).await
        }

        async fn insert_boost(&self, boost: &Boost) -> kora_store::Result<()> {
            if self.fail_insert_boost {
                return Err(kora_store::StoreError::Constraint(
                    "injected boost failure".to_string(),
                ));
            }
            self.inner.insert_boost(boost).await
        }

        async fn active_boosts(&self, post_id: &str, now: u64) -> kora_store::Result<Vec<Boost>> {
            self.inner.active_boosts(post_id, now).await
        }

        async fn find_boost(&self, boost_id: &str) -> kora_store::Result<Option<Boost>> {
            self.inner.find_boost(boost_id).await
        }

        async fn owner_of_withdrawal(
            &self,
            withdrawal_id: &str,
        ) -> kora_store::Result<Option<UserId>> {
            self.inner.owner_of_withdrawal(withdrawal_id).await
        }

        async fn append_audit(
            &self,
            admin_id: &str,
            action: &str,
            detail: &serde_json::Value,
            timestamp: u64,
        ) -> kora_store::Result<AuditLogEntry> {
            self.inner.append_audit(admin_id, action, detail, timestamp).await
        }

        async fn audit_log(&self, limit: u32) -> kora_store::Result<Vec<AuditLogEntry>> {
            self.inner.audit_log(limit).await
        }

        async fn users_with_maturing_holds(
            &self,
            since: u64,
            until: u64,
        ) -> kora_store::Result<Vec<UserId>> {
            self.inner.users_with_maturing_holds(since, until).await
        }
    }

    fn failing_engine(store: FailingStore) -> crate::LedgerEngine<FailingStore> {
        crate::LedgerEngine::new(
            store,
            EngineConfig::default(),
            FixedClock::at(BASE),
            Arc::new(StubGateway),
            Arc::new(StaticIdentity {
                verified: false,
                followers: 0,
            }),
        )
        .expect("engine")
    }

    #[tokio::test]
    async fn test_creator_credit_failure_refunds_booster() {
        let mut store = FailingStore::new();
        store.fail_commits_for = Some("creator".to_string());
        let engine = failing_engine(store);
        fund(&engine, "booster", 1_000).await;

        let err = engine
            .boost_post("booster", "post-1", "creator", None)
            .await
            .expect_err("creator commit fails");
        assert!(matches!(err, LedgerError::Store(_)));

        // The booster is made whole and no boost promotes the post.
        let booster = engine.balance_of("booster").await.expect("balance");
        assert_eq!(booster.total_balance, 1_000);
        assert_eq!(booster.available_balance, 1_000);
        assert!(engine.active_boosts("post-1").await.expect("active").is_empty());

        // Reserve never saw the failed purchase.
        let reserve = engine.reserve_balance().await.expect("reserve");
        assert_eq!(reserve.total_balance, 0);
    }

    #[tokio::test]
    async fn test_reserve_failure_refunds_everyone() {
        let mut store = FailingStore::new();
        store.fail_reserve = true;
        let engine = failing_engine(store);
        fund(&engine, "booster", 1_000).await;

        engine
            .boost_post("booster", "post-1", "creator", None)
            .await
            .expect_err("reserve commit fails");

        let booster = engine.balance_of("booster").await.expect("balance");
        assert_eq!(booster.total_balance, 1_000);

        // The creator credit was reversed; the entry pair cancels.
        let creator = engine.balance_of("creator").await.expect("balance");
        assert_eq!(creator.total_balance, 0);
        assert!(engine.active_boosts("post-1").await.expect("active").is_empty());
    }

    #[tokio::test]
    async fn test_boost_record_failure_refunds_everyone() {
        let mut store = FailingStore::new();
        store.fail_insert_boost = true;
        let engine = failing_engine(store);
        fund(&engine, "booster", 1_000).await;

        engine
            .boost_post("booster", "post-1", "creator", None)
            .await
            .expect_err("boost insert fails");

        let booster = engine.balance_of("booster").await.expect("balance");
        assert_eq!(booster.total_balance, 1_000);
        let creator = engine.balance_of("creator").await.expect("balance");
        assert_eq!(creator.total_balance, 0);
        let reserve = engine.reserve_balance().await.expect("reserve");
        assert_eq!(reserve.total_balance, 0);
    }
}
