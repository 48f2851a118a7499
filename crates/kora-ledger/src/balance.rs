//! Balance derivation.
//!
//! The three balances are a pure fold over a user's entries at a given
//! `now`. Nothing is mutated when a hold matures; the same entry simply
//! folds into `available` instead of `on_hold` once `available_at`
//! passes. Any two readers folding the same entries at the same time get
//! the same balances, which is what lets the lazy read path and the
//! background sweep coexist.

use kora_types::{Account, EntryKind, LedgerEntry, Withdrawal, WithdrawalStatus};

use crate::{LedgerError, Result};

/// A derived balance triple. Always satisfies
/// `total == available + on_hold`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balances {
    pub total: u64,
    pub available: u64,
    pub on_hold: u64,
}

impl Balances {
    /// Whether the cached account row matches this derivation.
    pub fn matches(&self, account: &Account) -> bool {
        account.total_balance == self.total
            && account.available_balance == self.available
            && account.on_hold_balance == self.on_hold
    }
}

/// Fold entries into balances at `now`.
///
/// Fails with [`LedgerError::Inconsistent`] if any running balance goes
/// negative — entries are validated before append, so that means the
/// stored history is corrupt.
pub fn derive_balances<'a, I>(entries: I, now: u64) -> Result<Balances>
where
    I: IntoIterator<Item = &'a LedgerEntry>,
{
    let mut total: i128 = 0;
    let mut available: i128 = 0;
    let mut on_hold: i128 = 0;

    for entry in entries {
        let amount = i128::from(entry.amount);
        match entry.kind {
            EntryKind::EngagementEarn | EntryKind::SubscriptionEarn | EntryKind::BoostEarn => {
                // Credits sit on hold until available_at; an earn
                // reversal carries the original's available_at so the
                // pair cancels in the same bucket at every `now`.
                total += amount;
                if entry.held_at(now) {
                    on_hold += amount;
                } else {
                    available += amount;
                }
            }
            EntryKind::AdminAdjustment => {
                total += amount;
                if amount > 0 && entry.held_at(now) {
                    on_hold += amount;
                } else {
                    available += amount;
                }
            }
            EntryKind::BoostCost | EntryKind::Conversion => {
                // Debits (or their positive reversals) against spendable
                // funds.
                total += amount;
                available += amount;
            }
            EntryKind::WithdrawalHold => {
                // amount < 0: |amount| moves available -> on-hold, total
                // unchanged.
                available += amount;
                on_hold -= amount;
            }
            EntryKind::WithdrawalRelease => {
                if amount > 0 {
                    // Rejection: the hold returns to available.
                    on_hold -= amount;
                    available += amount;
                } else {
                    // Settlement: the hold leaves the account.
                    on_hold += amount;
                    total += amount;
                }
            }
        }

        if total < 0 || available < 0 || on_hold < 0 {
            return Err(LedgerError::Inconsistent(format!(
                "negative balance after entry {} ({:?} {})",
                entry.entry_id, entry.kind, entry.amount
            )));
        }
    }

    Ok(Balances {
        total: clamp_u64(total)?,
        available: clamp_u64(available)?,
        on_hold: clamp_u64(on_hold)?,
    })
}

fn clamp_u64(value: i128) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| LedgerError::Inconsistent(format!("balance {value} outside u64 range")))
}

/// SA earned today through entries of `kind` (reversals not counted).
pub fn earned_on_day(entries: &[LedgerEntry], kind: EntryKind, day_start: u64) -> u64 {
    entries
        .iter()
        .filter(|e| e.kind == kind && e.amount > 0 && e.created_at >= day_start)
        .map(|e| e.amount as u64)
        .sum()
}

/// SA requested for withdrawal today. Rejected requests returned their
/// funds and do not count against the cap.
pub fn withdrawn_on_day(withdrawals: &[Withdrawal], day_start: u64) -> u64 {
    withdrawals
        .iter()
        .filter(|w| w.created_at >= day_start && w.status != WithdrawalStatus::Rejected)
        .map(|w| w.amount)
        .sum()
}

/// Creation time of the most recent withdrawal, any status. Cooldowns
/// run from the request, not from its outcome.
pub fn last_withdrawal_at(withdrawals: &[Withdrawal]) -> Option<u64> {
    withdrawals.iter().map(|w| w.created_at).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 1_700_000_000;
    const DAY: u64 = 86_400;

    fn entry(id: u64, kind: EntryKind, amount: i64, created_at: u64, available_at: u64) -> LedgerEntry {
        LedgerEntry {
            entry_id: id,
            user_id: "u1".to_string(),
            kind,
            amount,
            created_at,
            available_at,
            related_entity_id: None,
            reversal_of: None,
        }
    }

    #[test]
    fn test_earn_hold_then_release() {
        let entries = [entry(1, EntryKind::EngagementEarn, 50, BASE, BASE + DAY)];

        let before = derive_balances(&entries, BASE + DAY - 1).expect("derive");
        assert_eq!(before, Balances { total: 50, available: 0, on_hold: 50 });

        let after = derive_balances(&entries, BASE + DAY).expect("derive");
        assert_eq!(after, Balances { total: 50, available: 50, on_hold: 0 });

        // Evaluating again much later gives the same single release.
        let later = derive_balances(&entries, BASE + 10 * DAY).expect("derive");
        assert_eq!(later, after);
    }

    #[test]
    fn test_withdrawal_hold_and_rejection() {
        let entries = [
            entry(1, EntryKind::AdminAdjustment, 1_000, BASE, BASE),
            entry(2, EntryKind::WithdrawalHold, -600, BASE + 10, BASE + 10),
            entry(3, EntryKind::WithdrawalRelease, 600, BASE + 20, BASE + 20),
        ];

        let held = derive_balances(&entries[..2], BASE + 10).expect("derive");
        assert_eq!(held, Balances { total: 1_000, available: 400, on_hold: 600 });

        let released = derive_balances(&entries, BASE + 20).expect("derive");
        assert_eq!(released, Balances { total: 1_000, available: 1_000, on_hold: 0 });
    }

    #[test]
    fn test_withdrawal_settlement_removes_funds() {
        let entries = [
            entry(1, EntryKind::AdminAdjustment, 1_000, BASE, BASE),
            entry(2, EntryKind::WithdrawalHold, -600, BASE + 10, BASE + 10),
            entry(3, EntryKind::WithdrawalRelease, -600, BASE + 20, BASE + 20),
        ];

        let settled = derive_balances(&entries, BASE + 20).expect("derive");
        assert_eq!(settled, Balances { total: 400, available: 400, on_hold: 0 });
    }

    #[test]
    fn test_debits_hit_available_and_total() {
        let entries = [
            entry(1, EntryKind::AdminAdjustment, 500, BASE, BASE),
            entry(2, EntryKind::BoostCost, -100, BASE + 1, BASE + 1),
            entry(3, EntryKind::Conversion, -200, BASE + 2, BASE + 2),
        ];
        let balances = derive_balances(&entries, BASE + 2).expect("derive");
        assert_eq!(balances, Balances { total: 200, available: 200, on_hold: 0 });
    }

    #[test]
    fn test_earn_reversal_cancels_in_every_bucket() {
        let mut reversal = entry(2, EntryKind::BoostEarn, -50, BASE + 5, BASE + DAY);
        reversal.reversal_of = Some(1);
        let entries = [
            entry(1, EntryKind::BoostEarn, 50, BASE, BASE + DAY),
            reversal,
        ];

        for now in [BASE + 5, BASE + DAY - 1, BASE + DAY, BASE + 2 * DAY] {
            let balances = derive_balances(&entries, now).expect("derive");
            assert_eq!(balances, Balances::default(), "at now={now}");
        }
    }

    #[test]
    fn test_invariant_over_mixed_history() {
        let entries = [
            entry(1, EntryKind::EngagementEarn, 80, BASE, BASE + DAY),
            entry(2, EntryKind::SubscriptionEarn, 5, BASE + 100, BASE + 2 * DAY),
            entry(3, EntryKind::AdminAdjustment, 1_000, BASE + 200, BASE + 200),
            entry(4, EntryKind::BoostCost, -100, BASE + 300, BASE + 300),
            entry(5, EntryKind::WithdrawalHold, -500, BASE + 400, BASE + 400),
        ];

        for now in [BASE + 400, BASE + DAY, BASE + 3 * DAY] {
            let b = derive_balances(&entries, now).expect("derive");
            assert_eq!(b.total, b.available + b.on_hold, "at now={now}");
        }
    }

    #[test]
    fn test_overspend_detected() {
        let entries = [
            entry(1, EntryKind::AdminAdjustment, 100, BASE, BASE),
            entry(2, EntryKind::Conversion, -200, BASE + 1, BASE + 1),
        ];
        assert!(matches!(
            derive_balances(&entries, BASE + 1),
            Err(LedgerError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_day_window_sums() {
        let today = BASE - (BASE % DAY);
        let entries = [
            entry(1, EntryKind::EngagementEarn, 30, today - 10, today - 10),
            entry(2, EntryKind::EngagementEarn, 40, today + 10, today + DAY),
            entry(3, EntryKind::EngagementEarn, 20, today + 20, today + DAY),
            entry(4, EntryKind::SubscriptionEarn, 5, today + 30, today + 2 * DAY),
        ];
        assert_eq!(earned_on_day(&entries, EntryKind::EngagementEarn, today), 60);
        assert_eq!(earned_on_day(&entries, EntryKind::SubscriptionEarn, today), 5);
    }

    #[test]
    fn test_withdrawn_today_skips_rejected() {
        let today = BASE - (BASE % DAY);
        let wd = |id: &str, amount: u64, created_at: u64, status| Withdrawal {
            withdrawal_id: id.to_string(),
            user_id: "u1".to_string(),
            amount,
            currency: kora_types::Currency::Usd,
            method: "bank_transfer".to_string(),
            status,
            created_at,
            decided_at: None,
            decision_reason: None,
            gateway_reference: None,
        };
        let withdrawals = [
            wd("w1", 1_000, today - 10, WithdrawalStatus::Settled),
            wd("w2", 700, today + 10, WithdrawalStatus::Pending),
            wd("w3", 800, today + 20, WithdrawalStatus::Rejected),
            wd("w4", 600, today + 30, WithdrawalStatus::Approved),
        ];
        assert_eq!(withdrawn_on_day(&withdrawals, today), 1_300);
        assert_eq!(last_withdrawal_at(&withdrawals), Some(today + 30));
    }
}
