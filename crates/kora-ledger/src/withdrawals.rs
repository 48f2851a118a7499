//! Withdrawal lifecycle: request, admin decision, payout initiation,
//! and settlement.
//!
//! A request moves funds from available to on-hold without touching the
//! total; the total only drops at settlement, and a rejection returns
//! the hold to available. Every transition is one atomic user commit,
//! and settlement is idempotent so duplicate gateway webhooks are
//! harmless.

use kora_policy::withdrawal::{day_start, RequestContext, WithdrawalRejection};
use kora_store::{LedgerStore, WithdrawalUpdate};
use kora_types::{Currency, EntryKind, LedgerEntry, Withdrawal, WithdrawalStatus};

use crate::balance;
use crate::engine::{next_entry_id, random_id, store_balances, LedgerEngine, Step, UserPlan};
use crate::{LedgerError, Result};

/// Admin verdict on a pending withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WithdrawalDecision {
    Approve,
    Reject,
}

impl WithdrawalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl From<WithdrawalRejection> for LedgerError {
    fn from(rejection: WithdrawalRejection) -> Self {
        match rejection {
            WithdrawalRejection::BelowMinimum { minimum } => Self::BelowMinimum { minimum },
            WithdrawalRejection::InsufficientFunds {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
            WithdrawalRejection::DailyCapExceeded { cap, attempted } => {
                Self::DailyCapExceeded { cap, attempted }
            }
            WithdrawalRejection::CooldownActive { remaining_secs } => {
                Self::CooldownActive { remaining_secs }
            }
        }
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Open a payout request.
    ///
    /// Runs the policy checks in order (minimum, balance, daily cap,
    /// cooldown) against a fresh balance derivation, then atomically
    /// creates the pending withdrawal and its hold entry. Nothing is
    /// written when any check fails.
    pub async fn request_withdrawal(
        &self,
        user_id: &str,
        amount: u64,
        currency: Currency,
        method: &str,
    ) -> Result<Withdrawal> {
        let debit = i64::try_from(amount).map_err(|_| LedgerError::InvalidAmount {
            reason: "amount too large".to_string(),
        })?;
        // Verification status is read once up front; the policy checks
        // inside the commit loop are pure.
        let verified = self.identity.is_verified(user_id).await;
        let withdrawal_id = random_id("wd");

        let withdrawal = self
            .run_user_commit(user_id, |loaded, now| {
                let doc = loaded.ok_or_else(|| LedgerError::AccountNotFound {
                    user_id: user_id.to_string(),
                })?;
                let entries = doc.state.entries.as_slice();
                let withdrawals = doc.state.withdrawals.as_slice();

                let current = balance::derive_balances(entries, now)?;
                let ctx = RequestContext {
                    amount,
                    available: current.available,
                    verified,
                    withdrawn_today: balance::withdrawn_on_day(withdrawals, day_start(now)),
                    last_withdrawal_at: balance::last_withdrawal_at(withdrawals),
                    account_created_at: doc.state.account.created_at,
                    now,
                };
                self.config.withdrawal.evaluate_request(&ctx)?;

                let withdrawal = Withdrawal {
                    withdrawal_id: withdrawal_id.clone(),
                    user_id: user_id.to_string(),
                    amount,
                    currency,
                    method: method.to_string(),
                    status: WithdrawalStatus::Pending,
                    created_at: now,
                    decided_at: None,
                    decision_reason: None,
                    gateway_reference: None,
                };
                let hold = LedgerEntry {
                    entry_id: next_entry_id(entries),
                    user_id: user_id.to_string(),
                    kind: EntryKind::WithdrawalHold,
                    amount: -debit,
                    created_at: now,
                    available_at: now,
                    related_entity_id: Some(withdrawal_id.clone()),
                    reversal_of: None,
                };

                let balances =
                    balance::derive_balances(entries.iter().chain(std::iter::once(&hold)), now)?;
                let mut account = doc.state.account.clone();
                store_balances(&mut account, balances);

                let mut plan = UserPlan::new(account);
                plan.new_entries.push(hold);
                plan.new_withdrawal = Some(withdrawal.clone());
                Ok(Step::Commit(plan, withdrawal))
            })
            .await?;

        tracing::info!(
            user_id,
            withdrawal_id = %withdrawal.withdrawal_id,
            amount,
            currency = currency.as_str(),
            "withdrawal requested"
        );
        Ok(withdrawal)
    }

    /// Admin decision on a pending withdrawal. Audited.
    ///
    /// Approval leaves the funds on hold for the external payout;
    /// rejection appends a reversing release entry that returns the hold
    /// to available.
    pub async fn decide_withdrawal(
        &self,
        admin_id: &str,
        withdrawal_id: &str,
        decision: WithdrawalDecision,
        reason: Option<String>,
    ) -> Result<Withdrawal> {
        let user_id = self.owner_of(withdrawal_id).await?;

        let withdrawal = self
            .run_user_commit(&user_id, |loaded, now| {
                let doc = loaded.ok_or_else(|| LedgerError::WithdrawalNotFound {
                    withdrawal_id: withdrawal_id.to_string(),
                })?;
                let target = find_withdrawal(&doc.state.withdrawals, withdrawal_id)?;
                let next_status = match decision {
                    WithdrawalDecision::Approve => WithdrawalStatus::Approved,
                    WithdrawalDecision::Reject => WithdrawalStatus::Rejected,
                };
                if !target.status.can_transition(next_status) {
                    return Err(LedgerError::InvalidTransition {
                        from: target.status.as_str(),
                        to: next_status.as_str(),
                    });
                }

                let entries = doc.state.entries.as_slice();
                let mut account = doc.state.account.clone();
                let mut plan = UserPlan::new(account.clone());

                if decision == WithdrawalDecision::Reject {
                    let release = LedgerEntry {
                        entry_id: next_entry_id(entries),
                        user_id: user_id.clone(),
                        kind: EntryKind::WithdrawalRelease,
                        amount: target.amount as i64,
                        created_at: now,
                        available_at: now,
                        related_entity_id: Some(withdrawal_id.to_string()),
                        reversal_of: hold_entry_id(entries, withdrawal_id),
                    };
                    let balances = balance::derive_balances(
                        entries.iter().chain(std::iter::once(&release)),
                        now,
                    )?;
                    store_balances(&mut account, balances);
                    plan.account = account;
                    plan.new_entries.push(release);
                }

                let mut decided = target.clone();
                decided.status = next_status;
                decided.decided_at = Some(now);
                decided.decision_reason = reason.clone();
                plan.withdrawal_update = Some(WithdrawalUpdate {
                    withdrawal_id: withdrawal_id.to_string(),
                    status: next_status,
                    decided_at: Some(now),
                    decision_reason: reason.clone(),
                    gateway_reference: None,
                });
                Ok(Step::Commit(plan, decided))
            })
            .await?;

        self.store
            .append_audit(
                admin_id,
                "decide_withdrawal",
                &serde_json::json!({
                    "withdrawal_id": withdrawal_id,
                    "user_id": user_id,
                    "decision": decision.as_str(),
                    "reason": withdrawal.decision_reason,
                }),
                self.clock.now(),
            )
            .await?;

        tracing::info!(
            admin_id,
            withdrawal_id,
            decision = decision.as_str(),
            "withdrawal decided"
        );
        Ok(withdrawal)
    }

    /// Hand an approved withdrawal to the payment gateway and record the
    /// checkout reference.
    ///
    /// A gateway failure surfaces as [`LedgerError::GatewayUnavailable`]
    /// with the withdrawal still `approved`, so the call is safe to
    /// retry. A withdrawal that already carries a reference is returned
    /// as-is instead of creating a second checkout.
    pub async fn initiate_payout(&self, withdrawal_id: &str) -> Result<Withdrawal> {
        let user_id = self.owner_of(withdrawal_id).await?;
        let doc = self
            .store
            .load_user(&user_id)
            .await?
            .ok_or_else(|| LedgerError::WithdrawalNotFound {
                withdrawal_id: withdrawal_id.to_string(),
            })?;
        let target = find_withdrawal(&doc.state.withdrawals, withdrawal_id)?.clone();

        if target.status != WithdrawalStatus::Approved {
            return Err(LedgerError::InvalidTransition {
                from: target.status.as_str(),
                to: "payout",
            });
        }
        if target.gateway_reference.is_some() {
            return Ok(target);
        }

        let checkout = self
            .gateway
            .initiate_checkout(
                target.amount,
                target.currency,
                &serde_json::json!({
                    "withdrawal_id": withdrawal_id,
                    "user_id": user_id,
                    "method": target.method,
                }),
            )
            .await
            .map_err(|e| LedgerError::GatewayUnavailable {
                reason: e.to_string(),
            })?;

        let withdrawal = self
            .run_user_commit(&user_id, |loaded, _now| {
                let doc = loaded.ok_or_else(|| LedgerError::WithdrawalNotFound {
                    withdrawal_id: withdrawal_id.to_string(),
                })?;
                let target = find_withdrawal(&doc.state.withdrawals, withdrawal_id)?;
                if target.status != WithdrawalStatus::Approved {
                    return Err(LedgerError::InvalidTransition {
                        from: target.status.as_str(),
                        to: "payout",
                    });
                }

                let mut updated = target.clone();
                updated.gateway_reference = Some(checkout.reference.clone());
                let mut plan = UserPlan::new(doc.state.account.clone());
                plan.withdrawal_update = Some(WithdrawalUpdate {
                    withdrawal_id: withdrawal_id.to_string(),
                    status: WithdrawalStatus::Approved,
                    decided_at: None,
                    decision_reason: None,
                    gateway_reference: Some(checkout.reference.clone()),
                });
                Ok(Step::Commit(plan, updated))
            })
            .await?;

        tracing::info!(
            withdrawal_id,
            reference = %checkout.reference,
            "payout initiated with gateway"
        );
        Ok(withdrawal)
    }

    /// Ask the gateway for the state of an initiated payout and settle
    /// on confirmation.
    ///
    /// A still-pending payout leaves the withdrawal untouched; a failed
    /// one is logged and left `approved` so the payout can be
    /// re-initiated. Safe to call repeatedly.
    pub async fn confirm_payout(&self, withdrawal_id: &str) -> Result<Withdrawal> {
        let user_id = self.owner_of(withdrawal_id).await?;
        let doc = self
            .store
            .load_user(&user_id)
            .await?
            .ok_or_else(|| LedgerError::WithdrawalNotFound {
                withdrawal_id: withdrawal_id.to_string(),
            })?;
        let target = find_withdrawal(&doc.state.withdrawals, withdrawal_id)?.clone();
        if target.status == WithdrawalStatus::Settled {
            return Ok(target);
        }
        let reference = target.gateway_reference.clone().ok_or_else(|| {
            LedgerError::InvalidTransition {
                from: target.status.as_str(),
                to: "confirm",
            }
        })?;

        let outcome = self
            .gateway
            .verify(&reference)
            .await
            .map_err(|e| LedgerError::GatewayUnavailable {
                reason: e.to_string(),
            })?;
        match outcome {
            crate::traits::PayoutOutcome::Completed => self.settle_withdrawal(withdrawal_id).await,
            crate::traits::PayoutOutcome::Pending => Ok(target),
            crate::traits::PayoutOutcome::Failed => {
                tracing::warn!(withdrawal_id, %reference, "gateway reports payout failed");
                Ok(target)
            }
        }
    }

    /// Settle an approved withdrawal after the gateway confirmed the
    /// payout: the held amount leaves the account entirely.
    ///
    /// Idempotent: settling an already-settled withdrawal is a no-op
    /// success, which is what duplicate webhook delivery requires.
    pub async fn settle_withdrawal(&self, withdrawal_id: &str) -> Result<Withdrawal> {
        let user_id = self.owner_of(withdrawal_id).await?;

        let withdrawal = self
            .run_user_commit(&user_id, |loaded, now| {
                let doc = loaded.ok_or_else(|| LedgerError::WithdrawalNotFound {
                    withdrawal_id: withdrawal_id.to_string(),
                })?;
                let target = find_withdrawal(&doc.state.withdrawals, withdrawal_id)?;

                if target.status == WithdrawalStatus::Settled {
                    return Ok(Step::Done(target.clone()));
                }
                if !target.status.can_transition(WithdrawalStatus::Settled) {
                    return Err(LedgerError::InvalidTransition {
                        from: target.status.as_str(),
                        to: WithdrawalStatus::Settled.as_str(),
                    });
                }

                let entries = doc.state.entries.as_slice();
                let release = LedgerEntry {
                    entry_id: next_entry_id(entries),
                    user_id: user_id.clone(),
                    kind: EntryKind::WithdrawalRelease,
                    amount: -(target.amount as i64),
                    created_at: now,
                    available_at: now,
                    related_entity_id: Some(withdrawal_id.to_string()),
                    reversal_of: None,
                };
                let balances = balance::derive_balances(
                    entries.iter().chain(std::iter::once(&release)),
                    now,
                )?;
                let mut account = doc.state.account.clone();
                store_balances(&mut account, balances);

                let mut settled = target.clone();
                settled.status = WithdrawalStatus::Settled;
                let mut plan = UserPlan::new(account);
                plan.new_entries.push(release);
                plan.withdrawal_update = Some(WithdrawalUpdate {
                    withdrawal_id: withdrawal_id.to_string(),
                    status: WithdrawalStatus::Settled,
                    decided_at: None,
                    decision_reason: None,
                    gateway_reference: None,
                });
                Ok(Step::Commit(plan, settled))
            })
            .await?;

        tracing::info!(withdrawal_id, user_id = %user_id, "withdrawal settled");
        Ok(withdrawal)
    }

    /// A user's withdrawal requests, newest first.
    pub async fn withdrawals_of(&self, user_id: &str, limit: usize) -> Result<Vec<Withdrawal>> {
        let doc = self
            .store
            .load_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound {
                user_id: user_id.to_string(),
            })?;
        Ok(doc
            .state
            .withdrawals
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn owner_of(&self, withdrawal_id: &str) -> Result<String> {
        self.store
            .owner_of_withdrawal(withdrawal_id)
            .await?
            .ok_or_else(|| LedgerError::WithdrawalNotFound {
                withdrawal_id: withdrawal_id.to_string(),
            })
    }
}

fn find_withdrawal<'a>(
    withdrawals: &'a [Withdrawal],
    withdrawal_id: &str,
) -> Result<&'a Withdrawal> {
    withdrawals
        .iter()
        .find(|w| w.withdrawal_id == withdrawal_id)
        .ok_or_else(|| LedgerError::WithdrawalNotFound {
            withdrawal_id: withdrawal_id.to_string(),
        })
}

/// Entry id of the hold a release reverses.
fn hold_entry_id(entries: &[LedgerEntry], withdrawal_id: &str) -> Option<u64> {
    entries
        .iter()
        .find(|e| {
            e.kind == EntryKind::WithdrawalHold
                && e.related_entity_id.as_deref() == Some(withdrawal_id)
        })
        .map(|e| e.entry_id)
}
