//! Boost cost distribution.
//!
//! A boost purchase is split three ways:
//!
//! - **Creator** of the boosted post: default 50%
//! - **Platform**: default 30%
//! - **Reserve**: default 20%
//!
//! The percentages must always sum to 100 and are validated when the
//! engine is configured, not per call. The platform and reserve shares
//! both land in the reserve account.

use serde::{Deserialize, Serialize};

use crate::{PolicyError, Result};

/// Default creator share percentage.
pub const DEFAULT_CREATOR_PCT: u8 = 50;

/// Default platform share percentage.
pub const DEFAULT_PLATFORM_PCT: u8 = 30;

/// Default reserve share percentage.
pub const DEFAULT_RESERVE_PCT: u8 = 20;

/// Boost split configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostSplitConfig {
    /// Creator share percentage.
    pub creator_pct: u8,
    /// Platform share percentage.
    pub platform_pct: u8,
    /// Reserve share percentage.
    pub reserve_pct: u8,
}

/// Default boost split: creator=50, platform=30, reserve=20.
pub const DEFAULT_SPLIT: BoostSplitConfig = BoostSplitConfig {
    creator_pct: DEFAULT_CREATOR_PCT,
    platform_pct: DEFAULT_PLATFORM_PCT,
    reserve_pct: DEFAULT_RESERVE_PCT,
};

impl Default for BoostSplitConfig {
    fn default() -> Self {
        DEFAULT_SPLIT
    }
}

/// Validate a boost split configuration.
///
/// # Errors
///
/// - [`PolicyError::InvalidSplitTotal`] if percentages do not sum to 100
pub fn validate_split(config: &BoostSplitConfig) -> Result<()> {
    let total =
        config.creator_pct as u16 + config.platform_pct as u16 + config.reserve_pct as u16;
    if total != 100 {
        return Err(PolicyError::InvalidSplitTotal { total });
    }
    Ok(())
}

/// Distribute a boost cost according to the split configuration.
///
/// Returns `(creator_amount, platform_amount, reserve_amount)` in SA.
/// Creator and platform shares are floored; the reserve absorbs the
/// rounding remainder so the three always sum to `cost`.
///
/// # Errors
///
/// - [`PolicyError::ZeroAmount`] if the cost is zero
/// - [`PolicyError::InvalidSplitTotal`] if the split is invalid
/// - [`PolicyError::Overflow`] on arithmetic overflow
pub fn distribute(cost: u64, split: &BoostSplitConfig) -> Result<(u64, u64, u64)> {
    if cost == 0 {
        return Err(PolicyError::ZeroAmount);
    }
    validate_split(split)?;

    let creator_amount = cost
        .checked_mul(split.creator_pct as u64)
        .ok_or(PolicyError::Overflow)?
        / 100;

    let platform_amount = cost
        .checked_mul(split.platform_pct as u64)
        .ok_or(PolicyError::Overflow)?
        / 100;

    // Reserve takes the remainder to avoid rounding loss
    let reserve_amount = cost - creator_amount - platform_amount;

    Ok((creator_amount, platform_amount, reserve_amount))
}
