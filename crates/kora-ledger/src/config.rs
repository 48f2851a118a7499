//! Engine configuration.

use serde::{Deserialize, Serialize};

use kora_policy::earn::EarnPolicy;
use kora_policy::rates::RateTable;
use kora_policy::splits::{validate_split, BoostSplitConfig};
use kora_policy::withdrawal::WithdrawalPolicy;
use kora_types::{DAY_SECS, HOUR_SECS};

use crate::{LedgerError, Result};

/// Boost price in SA.
pub const DEFAULT_BOOST_COST: u64 = 100;

/// How long a boost promotes its post.
pub const DEFAULT_BOOST_DURATION_SECS: u64 = 24 * HOUR_SECS;

/// Premium subscription period.
pub const DEFAULT_SUBSCRIPTION_PERIOD_SECS: u64 = 30 * DAY_SECS;

/// Follower threshold for a verification application.
pub const DEFAULT_VERIFICATION_MIN_FOLLOWERS: u64 = 3_000;

/// Bound on optimistic-commit retries per operation.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 8;

/// All policy knobs the engine runs with. Validated once in
/// [`crate::LedgerEngine::new`]; invalid configurations never reach an
/// operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub withdrawal: WithdrawalPolicy,
    pub split: BoostSplitConfig,
    pub rates: RateTable,
    pub earn: EarnPolicy,
    pub boost_cost: u64,
    pub boost_duration_secs: u64,
    pub subscription_period_secs: u64,
    pub verification_min_followers: u64,
    pub max_commit_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            withdrawal: WithdrawalPolicy::default(),
            split: BoostSplitConfig::default(),
            rates: RateTable::default(),
            earn: EarnPolicy::default(),
            boost_cost: DEFAULT_BOOST_COST,
            boost_duration_secs: DEFAULT_BOOST_DURATION_SECS,
            subscription_period_secs: DEFAULT_SUBSCRIPTION_PERIOD_SECS,
            verification_min_followers: DEFAULT_VERIFICATION_MIN_FOLLOWERS,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.withdrawal
            .validate()
            .map_err(|e| LedgerError::Config(e.to_string()))?;
        validate_split(&self.split).map_err(|e| LedgerError::Config(e.to_string()))?;
        self.rates
            .validate()
            .map_err(|e| LedgerError::Config(e.to_string()))?;
        self.earn
            .validate()
            .map_err(|e| LedgerError::Config(e.to_string()))?;
        if self.boost_cost == 0 {
            return Err(LedgerError::Config("boost cost must be positive".into()));
        }
        if self.max_commit_attempts == 0 {
            return Err(LedgerError::Config(
                "commit attempt bound must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        EngineConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn test_bad_split_rejected() {
        let mut config = EngineConfig::default();
        config.split.reserve_pct = 30;
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_zero_boost_cost_rejected() {
        let config = EngineConfig {
            boost_cost: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
