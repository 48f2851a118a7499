//! Append-only ledger entries.

use serde::{Deserialize, Serialize};

use crate::{EntryId, UserId};

/// The kind of a ledger entry. Fixed set; the sign of the amount is
/// determined by the kind (see [`LedgerEntry`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    EngagementEarn,
    SubscriptionEarn,
    BoostEarn,
    BoostCost,
    Conversion,
    WithdrawalHold,
    WithdrawalRelease,
    AdminAdjustment,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EngagementEarn => "engagement_earn",
            Self::SubscriptionEarn => "subscription_earn",
            Self::BoostEarn => "boost_earn",
            Self::BoostCost => "boost_cost",
            Self::Conversion => "conversion",
            Self::WithdrawalHold => "withdrawal_hold",
            Self::WithdrawalRelease => "withdrawal_release",
            Self::AdminAdjustment => "admin_adjustment",
        }
    }

    pub fn parse(s: &str) -> Result<Self, crate::ParseEnumError> {
        match s {
            "engagement_earn" => Ok(Self::EngagementEarn),
            "subscription_earn" => Ok(Self::SubscriptionEarn),
            "boost_earn" => Ok(Self::BoostEarn),
            "boost_cost" => Ok(Self::BoostCost),
            "conversion" => Ok(Self::Conversion),
            "withdrawal_hold" => Ok(Self::WithdrawalHold),
            "withdrawal_release" => Ok(Self::WithdrawalRelease),
            "admin_adjustment" => Ok(Self::AdminAdjustment),
            other => Err(crate::ParseEnumError {
                what: "entry kind",
                value: other.to_string(),
            }),
        }
    }

    /// Earn kinds credit the account and may carry a hold.
    pub fn is_earn(&self) -> bool {
        matches!(
            self,
            Self::EngagementEarn | Self::SubscriptionEarn | Self::BoostEarn
        )
    }
}

/// One immutable ledger record.
///
/// Entries are never mutated or deleted; corrections are new entries with
/// the inverse sign and `reversal_of` pointing at the original.
///
/// Sign conventions by kind:
/// - earn kinds and positive `admin_adjustment`: amount > 0, credited to
///   total, and to available once `available_at` passes (on hold before)
/// - `boost_cost`, `conversion`, negative `admin_adjustment`: amount < 0,
///   debited from total and available
/// - `withdrawal_hold`: amount < 0, moves |amount| from available to
///   on-hold; total unchanged
/// - `withdrawal_release`: amount > 0 returns the hold to available
///   (rejection); amount < 0 removes the hold from total (settlement)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Per-user monotonically increasing sequence number.
    pub entry_id: EntryId,
    pub user_id: UserId,
    pub kind: EntryKind,
    pub amount: i64,
    pub created_at: u64,
    /// When the amount becomes spendable. Equals `created_at` for
    /// instant entries.
    pub available_at: u64,
    /// Post, withdrawal, or boost this entry relates to.
    pub related_entity_id: Option<String>,
    pub reversal_of: Option<EntryId>,
}

impl LedgerEntry {
    /// Whether the credited amount is still held back at `now`.
    pub fn held_at(&self, now: u64) -> bool {
        self.available_at > now
    }
}
