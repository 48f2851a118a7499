//! Per-user account records.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Subscription tier of an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Premium,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }

    pub fn parse(s: &str) -> Result<Self, crate::ParseEnumError> {
        match s {
            "free" => Ok(Self::Free),
            "premium" => Ok(Self::Premium),
            other => Err(crate::ParseEnumError {
                what: "subscription tier",
                value: other.to_string(),
            }),
        }
    }
}

/// A user's balance account.
///
/// The three balances are a materialized view over the user's ledger
/// entries; the engine recomputes them on every operation and this record
/// is what external readers see. Invariant: `total_balance ==
/// available_balance + on_hold_balance`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub total_balance: u64,
    pub available_balance: u64,
    pub on_hold_balance: u64,
    pub subscription_tier: SubscriptionTier,
    /// When the current premium period lapses. Ignored for free accounts.
    pub subscription_expires_at: Option<u64>,
    pub created_at: u64,
}

impl Account {
    /// A fresh zero-balance account.
    pub fn new(user_id: UserId, created_at: u64) -> Self {
        Self {
            user_id,
            total_balance: 0,
            available_balance: 0,
            on_hold_balance: 0,
            subscription_tier: SubscriptionTier::Free,
            subscription_expires_at: None,
            created_at,
        }
    }

    /// Whether the balance invariant holds.
    pub fn balanced(&self) -> bool {
        self.total_balance == self.available_balance + self.on_hold_balance
    }

    /// Whether the account has an unexpired premium subscription.
    pub fn is_premium(&self, now: u64) -> bool {
        self.subscription_tier == SubscriptionTier::Premium
            && self.subscription_expires_at.map_or(true, |t| now < t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_balanced() {
        let acct = Account::new("u1".to_string(), 1000);
        assert!(acct.balanced());
        assert_eq!(acct.total_balance, 0);
        assert_eq!(acct.subscription_tier, SubscriptionTier::Free);
    }

    #[test]
    fn test_premium_expiry() {
        let mut acct = Account::new("u1".to_string(), 1000);
        acct.subscription_tier = SubscriptionTier::Premium;
        acct.subscription_expires_at = Some(2000);

        assert!(acct.is_premium(1999));
        assert!(!acct.is_premium(2000));
        assert!(!acct.is_premium(3000));
    }

    #[test]
    fn test_premium_without_expiry() {
        let mut acct = Account::new("u1".to_string(), 1000);
        acct.subscription_tier = SubscriptionTier::Premium;
        assert!(acct.is_premium(u64::MAX));
    }

    #[test]
    fn test_tier_round_trip() {
        assert_eq!(
            SubscriptionTier::parse("premium").expect("parse"),
            SubscriptionTier::Premium
        );
        assert_eq!(SubscriptionTier::Free.as_str(), "free");
        assert!(SubscriptionTier::parse("gold").is_err());
    }
}
