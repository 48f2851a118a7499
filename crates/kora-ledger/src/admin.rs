//! Admin surface: reserve adjustments, user balance adjustments, and the
//! audit log.
//!
//! Every admin operation writes an append-only audit record naming the
//! admin, the action, and its parameters. User adjustments go through
//! the same atomic entry path as everything else; there is no direct
//! balance write anywhere.

use kora_store::LedgerStore;
use kora_types::{AuditLogEntry, EntryKind, LedgerEntry, ReserveAccount};

use crate::engine::{ApplyEntry, LedgerEngine};
use crate::{LedgerError, Result};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Current reserve balances.
    pub async fn reserve_balance(&self) -> Result<ReserveAccount> {
        Ok(self.store.load_reserve().await?.reserve)
    }

    /// Signed adjustment of the platform reserve. Audited.
    ///
    /// The reserve never goes negative; a debit larger than the
    /// available reserve fails with `InsufficientFunds`.
    pub async fn adjust_reserve(
        &self,
        admin_id: &str,
        delta: i64,
        reason: &str,
    ) -> Result<ReserveAccount> {
        if delta == 0 {
            return Err(LedgerError::InvalidAmount {
                reason: "adjustment must be nonzero".to_string(),
            });
        }

        let reserve = self
            .run_reserve_commit(|reserve| {
                let mut next = reserve.clone();
                if delta > 0 {
                    let amount = delta.unsigned_abs();
                    next.total_balance = next
                        .total_balance
                        .checked_add(amount)
                        .ok_or_else(|| LedgerError::Inconsistent("reserve overflow".to_string()))?;
                    next.available_balance =
                        next.available_balance.checked_add(amount).ok_or_else(|| {
                            LedgerError::Inconsistent("reserve overflow".to_string())
                        })?;
                } else {
                    let amount = delta.unsigned_abs();
                    if next.available_balance < amount {
                        return Err(LedgerError::InsufficientFunds {
                            required: amount,
                            available: next.available_balance,
                        });
                    }
                    next.total_balance -= amount;
                    next.available_balance -= amount;
                }
                Ok(next)
            })
            .await?;

        self.store
            .append_audit(
                admin_id,
                "adjust_reserve",
                &serde_json::json!({ "delta": delta, "reason": reason }),
                self.clock.now(),
            )
            .await?;

        tracing::info!(admin_id, delta, "reserve adjusted");
        Ok(reserve)
    }

    /// Signed `admin_adjustment` entry on a user's ledger: positive to
    /// grant, negative to claw back (limited by available balance).
    /// Audited.
    pub async fn credit_admin_adjustment(
        &self,
        admin_id: &str,
        user_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<LedgerEntry> {
        let entry = self
            .apply_entry(ApplyEntry {
                user_id: user_id.to_string(),
                kind: EntryKind::AdminAdjustment,
                amount,
                hold_secs: None,
                related_entity_id: None,
                idempotency_key: None,
            })
            .await?;

        self.store
            .append_audit(
                admin_id,
                "adjust_user_balance",
                &serde_json::json!({
                    "user_id": user_id,
                    "amount": amount,
                    "entry_id": entry.entry_id,
                    "reason": reason,
                }),
                self.clock.now(),
            )
            .await?;

        tracing::info!(admin_id, user_id, amount, "user balance adjusted");
        Ok(entry)
    }

    /// Most recent audit records, newest first.
    pub async fn audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>> {
        Ok(self.store.audit_log(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::*;

    const BASE: u64 = 1_700_006_400;

    #[tokio::test]
    async fn test_adjust_reserve_both_directions() {
        let (engine, _clock) = engine_at(BASE);

        let reserve = engine
            .adjust_reserve("admin-1", 500, "seed float")
            .await
            .expect("credit");
        assert_eq!(reserve.total_balance, 500);
        assert!(reserve.balanced());

        let reserve = engine
            .adjust_reserve("admin-1", -200, "payout costs")
            .await
            .expect("debit");
        assert_eq!(reserve.total_balance, 300);
        assert_eq!(reserve.available_balance, 300);
    }

    #[tokio::test]
    async fn test_reserve_cannot_go_negative() {
        let (engine, _clock) = engine_at(BASE);
        engine
            .adjust_reserve("admin-1", 100, "seed")
            .await
            .expect("credit");

        assert!(matches!(
            engine.adjust_reserve("admin-1", -101, "too much").await,
            Err(LedgerError::InsufficientFunds {
                required: 101,
                available: 100
            })
        ));
        assert!(matches!(
            engine.adjust_reserve("admin-1", 0, "noop").await,
            Err(LedgerError::InvalidAmount { .. })
        ));
    }

    #[tokio::test]
    async fn test_user_adjustment_writes_entry_and_audit() {
        let (engine, _clock) = engine_at(BASE);
        let entry = engine
            .credit_admin_adjustment("admin-1", "u1", 250, "support credit")
            .await
            .expect("grant");
        assert_eq!(entry.kind, EntryKind::AdminAdjustment);
        assert_eq!(entry.amount, 250);

        let account = engine.balance_of("u1").await.expect("balance");
        assert_eq!(account.available_balance, 250);

        let log = engine.audit_log(10).await.expect("audit");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, "adjust_user_balance");
        assert_eq!(log[0].detail["user_id"], "u1");
    }

    #[tokio::test]
    async fn test_audit_log_newest_first() {
        let (engine, clock) = engine_at(BASE);
        engine
            .adjust_reserve("admin-1", 100, "first")
            .await
            .expect("first");
        clock.advance(10);
        engine
            .adjust_reserve("admin-2", 100, "second")
            .await
            .expect("second");

        let log = engine.audit_log(1).await.expect("audit");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].admin_id, "admin-2");
        assert_eq!(log[0].seq, 2);
    }
}
