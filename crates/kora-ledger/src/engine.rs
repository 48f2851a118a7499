//! The [`LedgerEngine`] core: construction, the optimistic-commit
//! driver, entry application, balance reads, conversion, subscriptions,
//! and the hold sweep.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kora_policy::holds;
use kora_policy::withdrawal::day_start;
use kora_store::{
    IdempotencyRecord, LedgerStore, StoreError, UserCommit, UserState, VersionedUser,
    WithdrawalUpdate,
};
use kora_types::{Account, Currency, EntryKind, LedgerEntry, SubscriptionTier, Withdrawal};

use crate::balance::{self, Balances};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::traits::{IdentityDirectory, PaymentGateway};
use crate::{LedgerError, Result};

/// Parameters for [`LedgerEngine::apply_entry`].
#[derive(Clone, Debug)]
pub struct ApplyEntry {
    pub user_id: String,
    pub kind: EntryKind,
    pub amount: i64,
    /// Overrides the kind's default hold. Ignored for debits.
    pub hold_secs: Option<u64>,
    pub related_entity_id: Option<String>,
    pub idempotency_key: Option<String>,
}

/// Outcome of a conversion: the SA debit plus the informational fiat
/// amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub sa_amount: u64,
    pub converted_amount: u64,
    pub currency: Currency,
    pub entry_id: u64,
}

/// Whether a user can apply for verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEligibility {
    pub eligible: bool,
    pub follower_count: u64,
    pub required_followers: u64,
}

/// The ledger engine. Stateless between calls: every operation reads a
/// versioned user document, computes, and writes back through the
/// store's compare-and-write. Safe to share behind an `Arc` and call
/// concurrently.
pub struct LedgerEngine<S> {
    pub(crate) store: S,
    pub(crate) config: EngineConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) gateway: Arc<dyn PaymentGateway>,
    pub(crate) identity: Arc<dyn IdentityDirectory>,
}

/// Delta produced by one planning pass over a user document.
pub(crate) struct UserPlan {
    pub(crate) account: Account,
    pub(crate) new_entries: Vec<LedgerEntry>,
    pub(crate) new_withdrawal: Option<Withdrawal>,
    pub(crate) withdrawal_update: Option<WithdrawalUpdate>,
    pub(crate) new_idempotency: Option<IdempotencyRecord>,
}

impl UserPlan {
    pub(crate) fn new(account: Account) -> Self {
        Self {
            account,
            new_entries: Vec::new(),
            new_withdrawal: None,
            withdrawal_update: None,
            new_idempotency: None,
        }
    }
}

/// What a planner decided: write a delta, or finish without writing
/// (validation short-circuit or idempotent replay).
pub(crate) enum Step<T> {
    Commit(UserPlan, T),
    Done(T),
}

/// Next per-user entry sequence number.
pub(crate) fn next_entry_id(entries: &[LedgerEntry]) -> u64 {
    entries.last().map_or(1, |e| e.entry_id + 1)
}

/// `prefix-<8 random bytes hex>`.
pub(crate) fn random_id(prefix: &str) -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{prefix}-{}", hex::encode(bytes))
}

/// Write derived balances into the cached account row.
pub(crate) fn store_balances(account: &mut Account, balances: Balances) {
    account.total_balance = balances.total;
    account.available_balance = balances.available;
    account.on_hold_balance = balances.on_hold;
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Build an engine over a store and collaborators. Fails if the
    /// configuration can never admit valid operations.
    pub fn new(
        store: S,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn PaymentGateway>,
        identity: Arc<dyn IdentityDirectory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            clock,
            gateway,
            identity,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-plan-commit loop against one user document. The planner is
    /// re-run from a fresh snapshot after every version conflict, up to
    /// the configured attempt bound.
    pub(crate) async fn run_user_commit<T, F>(&self, user_id: &str, mut plan: F) -> Result<T>
    where
        F: FnMut(Option<&VersionedUser>, u64) -> Result<Step<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let loaded = self.store.load_user(user_id).await?;
            let now = self.clock.now();
            let expected_version = loaded.as_ref().map_or(0, |l| l.version);

            match plan(loaded.as_ref(), now)? {
                Step::Done(value) => return Ok(value),
                Step::Commit(user_plan, value) => {
                    let commit = UserCommit {
                        user_id: user_id.to_string(),
                        expected_version,
                        account: user_plan.account,
                        new_entries: user_plan.new_entries,
                        new_withdrawal: user_plan.new_withdrawal,
                        withdrawal_update: user_plan.withdrawal_update,
                        new_idempotency: user_plan.new_idempotency,
                    };
                    match self.store.commit_user(commit).await {
                        Ok(_) => return Ok(value),
                        Err(StoreError::VersionConflict) => {
                            if attempt >= self.config.max_commit_attempts {
                                tracing::warn!(
                                    user_id,
                                    attempt,
                                    "giving up after repeated version conflicts"
                                );
                                return Err(LedgerError::ConcurrentModification {
                                    attempts: attempt,
                                });
                            }
                            tracing::debug!(user_id, attempt, "version conflict, retrying");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Same loop for the reserve singleton.
    pub(crate) async fn run_reserve_commit<F>(
        &self,
        mut plan: F,
    ) -> Result<kora_types::ReserveAccount>
    where
        F: FnMut(&kora_types::ReserveAccount) -> Result<kora_types::ReserveAccount>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let loaded = self.store.load_reserve().await?;
            let next = plan(&loaded.reserve)?;
            match self.store.commit_reserve(next.clone(), loaded.version).await {
                Ok(_) => return Ok(next),
                Err(StoreError::VersionConflict) => {
                    if attempt >= self.config.max_commit_attempts {
                        return Err(LedgerError::ConcurrentModification { attempts: attempt });
                    }
                    tracing::debug!(attempt, "reserve version conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Append one ledger entry for a user, creating the account on
    /// first contact.
    ///
    /// Accepts earn kinds (positive amounts, default hold per kind) and
    /// `admin_adjustment` (either sign); the remaining kinds are written
    /// only by their own operations. Daily earn caps apply per UTC day;
    /// `subscription_earn` additionally requires an active premium
    /// subscription.
    pub async fn apply_entry(&self, params: ApplyEntry) -> Result<LedgerEntry> {
        if params.amount == 0 {
            return Err(LedgerError::InvalidAmount {
                reason: "amount must be nonzero".to_string(),
            });
        }
        if params.kind.is_earn() {
            if params.amount < 0 {
                return Err(LedgerError::InvalidAmount {
                    reason: format!("{} amounts must be positive", params.kind.as_str()),
                });
            }
        } else if params.kind != EntryKind::AdminAdjustment {
            return Err(LedgerError::InvalidAmount {
                reason: format!(
                    "{} entries are written by their own operation",
                    params.kind.as_str()
                ),
            });
        }

        let user_id = params.user_id.clone();
        let entry = self
            .run_user_commit(&user_id, |loaded, now| {
                if let (Some(key), Some(doc)) = (&params.idempotency_key, loaded) {
                    if let Some(record) = doc.state.idempotency.iter().find(|r| r.key == *key) {
                        return replayed_entry(&doc.state, record, key).map(Step::Done);
                    }
                }

                let mut account = match loaded {
                    Some(doc) => doc.state.account.clone(),
                    None => Account::new(user_id.clone(), now),
                };
                let entries: &[LedgerEntry] = loaded.map_or(&[], |doc| doc.state.entries.as_slice());

                if params.kind == EntryKind::SubscriptionEarn && !account.is_premium(now) {
                    return Err(LedgerError::InvalidAmount {
                        reason: "subscription earnings require an active premium subscription"
                            .to_string(),
                    });
                }

                if params.amount > 0 {
                    if let Some(cap) = self.config.earn.daily_cap(params.kind) {
                        let earned = balance::earned_on_day(entries, params.kind, day_start(now));
                        let attempted = earned.saturating_add(params.amount.unsigned_abs());
                        if attempted > cap {
                            return Err(LedgerError::DailyCapExceeded { cap, attempted });
                        }
                    }
                } else {
                    let current = balance::derive_balances(entries, now)?;
                    let required = params.amount.unsigned_abs();
                    if current.available < required {
                        return Err(LedgerError::InsufficientFunds {
                            required,
                            available: current.available,
                        });
                    }
                }

                let hold_secs = if params.amount > 0 {
                    params
                        .hold_secs
                        .unwrap_or_else(|| holds::default_hold_secs(params.kind))
                } else {
                    0
                };
                let entry = LedgerEntry {
                    entry_id: next_entry_id(entries),
                    user_id: user_id.clone(),
                    kind: params.kind,
                    amount: params.amount,
                    created_at: now,
                    available_at: now + hold_secs,
                    related_entity_id: params.related_entity_id.clone(),
                    reversal_of: None,
                };

                let balances = balance::derive_balances(
                    entries.iter().chain(std::iter::once(&entry)),
                    now,
                )?;
                store_balances(&mut account, balances);

                let mut plan = UserPlan::new(account);
                if let Some(key) = &params.idempotency_key {
                    plan.new_idempotency = Some(IdempotencyRecord {
                        key: key.clone(),
                        entry_id: Some(entry.entry_id),
                        boost_id: None,
                        created_at: now,
                    });
                }
                plan.new_entries.push(entry.clone());
                Ok(Step::Commit(plan, entry))
            })
            .await?;

        tracing::info!(
            user_id = %entry.user_id,
            entry_id = entry.entry_id,
            kind = entry.kind.as_str(),
            amount = entry.amount,
            "ledger entry applied"
        );
        Ok(entry)
    }

    /// Current balances for a user, recomputed from the entry history.
    /// A stale cache (holds matured since the last write) is written
    /// back before returning.
    pub async fn balance_of(&self, user_id: &str) -> Result<Account> {
        self.run_user_commit(user_id, |loaded, now| {
            let doc = loaded.ok_or_else(|| LedgerError::AccountNotFound {
                user_id: user_id.to_string(),
            })?;

            let balances = balance::derive_balances(&doc.state.entries, now)?;
            if balances.matches(&doc.state.account) {
                return Ok(Step::Done(doc.state.account.clone()));
            }

            tracing::debug!(user_id, "balance cache stale, rewriting");
            let mut account = doc.state.account.clone();
            store_balances(&mut account, balances);
            Ok(Step::Commit(UserPlan::new(account.clone()), account))
        })
        .await
    }

    /// Newest-first ledger entries for a user.
    pub async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        let doc = self
            .store
            .load_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound {
                user_id: user_id.to_string(),
            })?;
        Ok(doc.state.entries.iter().rev().take(limit).cloned().collect())
    }

    /// Debit `sa_amount` and quote it in `currency`.
    ///
    /// The fiat figure is informational; no money moves through the
    /// gateway here. Amounts that do not divide exactly at the
    /// configured rate are rejected, which is what keeps repeated
    /// conversions drift-free.
    pub async fn convert(&self, user_id: &str, sa_amount: u64, currency: Currency) -> Result<Quote> {
        let converted = self
            .config
            .rates
            .quote(sa_amount, currency)
            .map_err(|e| LedgerError::InvalidAmount {
                reason: e.to_string(),
            })?;
        let debit = i64::try_from(sa_amount).map_err(|_| LedgerError::InvalidAmount {
            reason: "amount too large".to_string(),
        })?;

        let quote = self
            .run_user_commit(user_id, |loaded, now| {
                let doc = loaded.ok_or_else(|| LedgerError::AccountNotFound {
                    user_id: user_id.to_string(),
                })?;
                let entries = doc.state.entries.as_slice();

                let current = balance::derive_balances(entries, now)?;
                if current.available < sa_amount {
                    return Err(LedgerError::InsufficientFunds {
                        required: sa_amount,
                        available: current.available,
                    });
                }

                let entry = LedgerEntry {
                    entry_id: next_entry_id(entries),
                    user_id: user_id.to_string(),
                    kind: EntryKind::Conversion,
                    amount: -debit,
                    created_at: now,
                    available_at: now,
                    related_entity_id: None,
                    reversal_of: None,
                };
                let balances = balance::derive_balances(
                    entries.iter().chain(std::iter::once(&entry)),
                    now,
                )?;
                let mut account = doc.state.account.clone();
                store_balances(&mut account, balances);

                let quote = Quote {
                    sa_amount,
                    converted_amount: converted,
                    currency,
                    entry_id: entry.entry_id,
                };
                let mut plan = UserPlan::new(account);
                plan.new_entries.push(entry);
                Ok(Step::Commit(plan, quote))
            })
            .await?;

        tracing::info!(
            user_id,
            sa_amount,
            converted = quote.converted_amount,
            currency = currency.as_str(),
            "conversion applied"
        );
        Ok(quote)
    }

    /// Grant (or renew) a 30-day premium subscription after the gateway
    /// confirmed the `SUB-` checkout. Idempotent per reference.
    pub async fn activate_subscription(
        &self,
        user_id: &str,
        gateway_reference: &str,
    ) -> Result<Account> {
        let key = format!("sub:{gateway_reference}");
        let account = self
            .run_user_commit(user_id, |loaded, now| {
                if let Some(doc) = loaded {
                    if doc.state.idempotency.iter().any(|r| r.key == key) {
                        return Ok(Step::Done(doc.state.account.clone()));
                    }
                }

                let mut account = match loaded {
                    Some(doc) => doc.state.account.clone(),
                    None => Account::new(user_id.to_string(), now),
                };
                account.subscription_tier = SubscriptionTier::Premium;
                account.subscription_expires_at =
                    Some(now + self.config.subscription_period_secs);

                let mut plan = UserPlan::new(account.clone());
                plan.new_idempotency = Some(IdempotencyRecord {
                    key: key.clone(),
                    entry_id: None,
                    boost_id: None,
                    created_at: now,
                });
                Ok(Step::Commit(plan, account))
            })
            .await?;

        tracing::info!(
            user_id,
            expires_at = account.subscription_expires_at,
            "premium subscription activated"
        );
        Ok(account)
    }

    /// Whether a user clears the follower bar for a verification
    /// application. Read-only.
    pub async fn verification_eligibility(&self, user_id: &str) -> VerificationEligibility {
        let follower_count = self.identity.follower_count(user_id).await;
        let required_followers = self.config.verification_min_followers;
        VerificationEligibility {
            eligible: follower_count >= required_followers,
            follower_count,
            required_followers,
        }
    }

    /// Rewrite stale balance caches for users whose holds matured in
    /// `(since, until]`. Returns how many users were checked. Individual
    /// failures are logged and skipped so one bad document cannot stall
    /// the sweep.
    pub async fn sweep_matured_holds(&self, since: u64, until: u64) -> Result<u32> {
        let users = self.store.users_with_maturing_holds(since, until).await?;
        let mut swept = 0;
        for user_id in users {
            match self.balance_of(&user_id).await {
                Ok(_) => swept += 1,
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "hold sweep skipped user");
                }
            }
        }
        Ok(swept)
    }
}

/// Recorded outcome for a replayed idempotency key on the entry path.
fn replayed_entry(
    state: &UserState,
    record: &IdempotencyRecord,
    key: &str,
) -> Result<LedgerEntry> {
    let entry_id = record.entry_id.ok_or_else(|| {
        LedgerError::Inconsistent(format!("idempotency key {key} has no recorded entry"))
    })?;
    state
        .entries
        .iter()
        .find(|e| e.entry_id == entry_id)
        .cloned()
        .ok_or_else(|| {
            LedgerError::Inconsistent(format!("entry {entry_id} missing for idempotency key {key}"))
        })
}
