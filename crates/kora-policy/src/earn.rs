//! Daily earn caps.
//!
//! Engagement earnings are capped per UTC day; subscription earnings are
//! a smaller daily grant available only to premium accounts.

use serde::{Deserialize, Serialize};

use kora_types::EntryKind;

use crate::{PolicyError, Result};

/// Daily earn cap configuration, in SA per UTC day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarnPolicy {
    /// Cap on engagement earnings.
    pub engagement_daily_cap: u64,
    /// Cap on subscription earnings (premium accounts only).
    pub subscription_daily_cap: u64,
}

impl Default for EarnPolicy {
    fn default() -> Self {
        Self {
            engagement_daily_cap: 80,
            subscription_daily_cap: 5,
        }
    }
}

impl EarnPolicy {
    /// The daily cap for an earn kind, if that kind is capped.
    pub fn daily_cap(&self, kind: EntryKind) -> Option<u64> {
        match kind {
            EntryKind::EngagementEarn => Some(self.engagement_daily_cap),
            EntryKind::SubscriptionEarn => Some(self.subscription_daily_cap),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engagement_daily_cap == 0 || self.subscription_daily_cap == 0 {
            return Err(PolicyError::InvalidConfig(
                "daily earn caps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = EarnPolicy::default();
        policy.validate().expect("default earn policy valid");
        assert_eq!(policy.daily_cap(EntryKind::EngagementEarn), Some(80));
        assert_eq!(policy.daily_cap(EntryKind::SubscriptionEarn), Some(5));
    }

    #[test]
    fn test_uncapped_kinds() {
        let policy = EarnPolicy::default();
        assert_eq!(policy.daily_cap(EntryKind::BoostEarn), None);
        assert_eq!(policy.daily_cap(EntryKind::AdminAdjustment), None);
    }

    #[test]
    fn test_zero_cap_rejected() {
        let policy = EarnPolicy {
            engagement_daily_cap: 0,
            subscription_daily_cap: 5,
        };
        assert!(policy.validate().is_err());
    }
}
