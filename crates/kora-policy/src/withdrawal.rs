//! Withdrawal request rules: minimum amount, daily caps, and cooldown
//! composition.
//!
//! Cooldowns compose additively: a base window (72 h for an account's
//! first-ever withdrawal measured from account creation, otherwise 48 h,
//! or 24 h for verified accounts, measured from the last request) plus a
//! 48 h surcharge for large amounts. All thresholds are in SA at the
//! reference rate of 100 SA per USD.

use serde::{Deserialize, Serialize};

use kora_types::{DAY_SECS, HOUR_SECS};

use crate::{PolicyError, Result};

/// The ordered checks a withdrawal request can fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum WithdrawalRejection {
    #[error("amount below minimum withdrawal of {minimum} SA")]
    BelowMinimum {
        /// The configured minimum.
        minimum: u64,
    },

    #[error("insufficient available balance: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("daily withdrawal cap of {cap} SA would be exceeded ({attempted} attempted)")]
    DailyCapExceeded { cap: u64, attempted: u64 },

    #[error("withdrawal cooldown active for another {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },
}

/// Everything the rules need to know about one request.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext {
    /// Requested amount in SA.
    pub amount: u64,
    /// The user's spendable balance.
    pub available: u64,
    /// Verified users get the higher cap and shorter cooldown.
    pub verified: bool,
    /// Sum of this user's withdrawals created since UTC midnight.
    pub withdrawn_today: u64,
    /// Creation time of the user's most recent withdrawal, any status.
    pub last_withdrawal_at: Option<u64>,
    /// Cooldown baseline for an account that has never withdrawn.
    pub account_created_at: u64,
    pub now: u64,
}

/// Withdrawal policy knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithdrawalPolicy {
    /// Minimum withdrawal amount in SA.
    pub minimum: u64,
    /// Daily cap for unverified users, in SA.
    pub daily_cap_normal: u64,
    /// Daily cap for verified users, in SA.
    pub daily_cap_verified: u64,
    /// Cooldown before an account's first-ever withdrawal.
    pub cooldown_first_secs: u64,
    /// Base cooldown between withdrawals.
    pub cooldown_normal_secs: u64,
    /// Base cooldown for verified users.
    pub cooldown_verified_secs: u64,
    /// Additional cooldown for large amounts.
    pub cooldown_large_secs: u64,
    /// Amounts at or above this add the large-amount surcharge.
    pub large_amount_threshold: u64,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            minimum: 500,
            daily_cap_normal: 5_000,
            daily_cap_verified: 30_000,
            cooldown_first_secs: 72 * HOUR_SECS,
            cooldown_normal_secs: 48 * HOUR_SECS,
            cooldown_verified_secs: 24 * HOUR_SECS,
            cooldown_large_secs: 48 * HOUR_SECS,
            large_amount_threshold: 10_000,
        }
    }
}

impl WithdrawalPolicy {
    /// The daily cap that applies to a user.
    pub fn daily_cap(&self, verified: bool) -> u64 {
        if verified {
            self.daily_cap_verified
        } else {
            self.daily_cap_normal
        }
    }

    /// The full cooldown for a request: base window plus the
    /// large-amount surcharge.
    pub fn required_cooldown_secs(&self, verified: bool, first: bool, amount: u64) -> u64 {
        let base = if first {
            self.cooldown_first_secs
        } else if verified {
            self.cooldown_verified_secs
        } else {
            self.cooldown_normal_secs
        };
        let surcharge = if amount >= self.large_amount_threshold {
            self.cooldown_large_secs
        } else {
            0
        };
        base + surcharge
    }

    /// Run the request checks in order: minimum, balance, daily cap,
    /// cooldown. Returns the first failure.
    pub fn evaluate_request(
        &self,
        ctx: &RequestContext,
    ) -> std::result::Result<(), WithdrawalRejection> {
        if ctx.amount < self.minimum {
            return Err(WithdrawalRejection::BelowMinimum {
                minimum: self.minimum,
            });
        }

        if ctx.available < ctx.amount {
            return Err(WithdrawalRejection::InsufficientFunds {
                required: ctx.amount,
                available: ctx.available,
            });
        }

        let cap = self.daily_cap(ctx.verified);
        let attempted = ctx.withdrawn_today.saturating_add(ctx.amount);
        if attempted > cap {
            return Err(WithdrawalRejection::DailyCapExceeded { cap, attempted });
        }

        let (baseline, first) = match ctx.last_withdrawal_at {
            Some(t) => (t, false),
            None => (ctx.account_created_at, true),
        };
        let required = self.required_cooldown_secs(ctx.verified, first, ctx.amount);
        let elapsed = ctx.now.saturating_sub(baseline);
        if elapsed < required {
            tracing::debug!(
                elapsed,
                required,
                first,
                verified = ctx.verified,
                "withdrawal rejected by cooldown"
            );
            return Err(WithdrawalRejection::CooldownActive {
                remaining_secs: required - elapsed,
            });
        }

        Ok(())
    }

    /// Reject configurations that can never admit a withdrawal. Run once
    /// at configuration load.
    pub fn validate(&self) -> Result<()> {
        if self.minimum == 0 {
            return Err(PolicyError::InvalidConfig(
                "minimum withdrawal must be positive".to_string(),
            ));
        }
        if self.daily_cap_normal < self.minimum || self.daily_cap_verified < self.minimum {
            return Err(PolicyError::InvalidConfig(
                "daily caps must be at least the minimum withdrawal".to_string(),
            ));
        }
        Ok(())
    }
}

/// Start of the UTC day containing `now`.
pub fn day_start(now: u64) -> u64 {
    now - (now % DAY_SECS)
}
