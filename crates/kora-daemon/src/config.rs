//! Configuration file management.
//!
//! The daemon reads `config.toml` from its data directory (overridable
//! with `KORA_DATA_DIR`) and falls back to defaults when the file does
//! not exist. Engine policy knobs live in the `[engine]` section and are
//! validated when the engine is constructed, so a config with boost
//! shares that do not sum to 100 fails at startup, not at call time.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use kora_ledger::EngineConfig;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ledger policy knobs, passed to the engine verbatim.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Background hold-release sweep.
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Static identity directory backing `is_verified`/`follower_count`.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Run on an in-memory database (state is lost on exit).
    #[serde(default)]
    pub ephemeral: bool,
}

/// Hold-release sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweep runs.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

/// Identity directory configuration.
///
/// Stands in for the platform's profile service: verified user ids and
/// follower counts are read from the config file. Users absent from both
/// tables read as unverified with zero followers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Users treated as verified.
    #[serde(default)]
    pub verified: Vec<String>,
    /// Follower counts by user id.
    #[serde(default)]
    pub followers: HashMap<String, u64>,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_sweep_interval() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            ephemeral: false,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: DaemonConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("KORA_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("KORA_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Kora")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".kora")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/kora"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.sweep.interval_secs, 300);
        assert_eq!(config.advanced.log_level, "info");
        assert!(!config.storage.ephemeral);
        // Engine defaults are valid.
        config.engine.validate().expect("engine defaults valid");
    }

    #[test]
    fn test_config_round_trip() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [storage]
            ephemeral = true

            [identity]
            verified = ["u-verified"]

            [identity.followers]
            u-verified = 5000
            "#,
        )
        .expect("parse");
        assert!(config.storage.ephemeral);
        assert_eq!(config.identity.verified, vec!["u-verified".to_string()]);
        assert_eq!(config.identity.followers["u-verified"], 5_000);
        assert_eq!(config.sweep.interval_secs, 300);
    }

    #[test]
    fn test_bad_split_rejected_at_validation() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [engine.split]
            creator_pct = 50
            platform_pct = 30
            reserve_pct = 30
            "#,
        )
        .expect("parse");
        assert!(config.engine.validate().is_err());
    }
}
