//! Hold durations per entry kind.
//!
//! Earned SA is held back for a fraud-deterrence window before it becomes
//! spendable. Boost earnings and admin adjustments are instant.

use kora_types::{EntryKind, HOUR_SECS};

/// Hold on engagement earnings (24 hours).
pub const ENGAGEMENT_HOLD_SECS: u64 = 24 * HOUR_SECS;

/// Hold on subscription earnings (48 hours).
pub const SUBSCRIPTION_HOLD_SECS: u64 = 48 * HOUR_SECS;

/// The default hold duration for an entry kind. Zero means the amount is
/// available immediately.
pub fn default_hold_secs(kind: EntryKind) -> u64 {
    match kind {
        EntryKind::EngagementEarn => ENGAGEMENT_HOLD_SECS,
        EntryKind::SubscriptionEarn => SUBSCRIPTION_HOLD_SECS,
        EntryKind::BoostEarn
        | EntryKind::BoostCost
        | EntryKind::Conversion
        | EntryKind::WithdrawalHold
        | EntryKind::WithdrawalRelease
        | EntryKind::AdminAdjustment => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earn_holds() {
        assert_eq!(default_hold_secs(EntryKind::EngagementEarn), 86_400);
        assert_eq!(default_hold_secs(EntryKind::SubscriptionEarn), 172_800);
    }

    #[test]
    fn test_instant_kinds() {
        assert_eq!(default_hold_secs(EntryKind::BoostEarn), 0);
        assert_eq!(default_hold_secs(EntryKind::Conversion), 0);
        assert_eq!(default_hold_secs(EntryKind::AdminAdjustment), 0);
    }
}
