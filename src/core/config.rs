//! Engine configuration loaded from `schema-travels.toml`.

use crate::core::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "schema-travels.toml";
pub const CONFIG_DIR_NAME: &str = ".schema-travels";

/// Bump when decision logic changes; cached entries from other versions are
/// never served.
pub const RECOMMENDATION_LOGIC_VERSION: &str = "1.2.0";

/// Hex characters of the SHA-256 digest kept as the lookup key. 16 hex chars
/// are 64 bits, so a collision needs on the order of 2^32 distinct inputs.
pub const DEFAULT_FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Exact counts and ratios participate in the fingerprint.
    #[default]
    Strict,
    /// Only pattern shape participates in the fingerprint.
    Relaxed,
}

/// Thresholds of the decision rule table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecisionThresholds {
    pub unbounded_children: u64,
    pub embed_co_access_ratio: f64,
    pub embed_max_child_write_ratio: f64,
    pub embed_max_children: u64,
    pub independent_child_solo_ratio: f64,
    pub mutable_child_write_ratio: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            unbounded_children: 1000,
            embed_co_access_ratio: 0.70,
            embed_max_child_write_ratio: 0.30,
            embed_max_children: 100,
            independent_child_solo_ratio: 0.40,
            mutable_child_write_ratio: 0.50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub mode: CacheMode,
    pub fingerprint_len: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            mode: CacheMode::Strict,
            fingerprint_len: DEFAULT_FINGERPRINT_LEN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdvisorConfig {
    pub enabled: bool,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: String::new(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub logic_version: String,
    pub rules: DecisionThresholds,
    pub cache: CacheConfig,
    pub advisor: AdvisorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            logic_version: RECOMMENDATION_LOGIC_VERSION.to_string(),
            rules: DecisionThresholds::default(),
            cache: CacheConfig::default(),
            advisor: AdvisorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.logic_version.trim().is_empty() {
            return Err(EngineError::Config(
                "logic_version cannot be empty".to_string(),
            ));
        }
        if self.cache.fingerprint_len == 0 || self.cache.fingerprint_len > 64 {
            return Err(EngineError::Config(format!(
                "cache.fingerprint_len must be in 1..=64, got {}",
                self.cache.fingerprint_len
            )));
        }
        let ratios = [
            ("rules.embed_co_access_ratio", self.rules.embed_co_access_ratio),
            (
                "rules.embed_max_child_write_ratio",
                self.rules.embed_max_child_write_ratio,
            ),
            (
                "rules.independent_child_solo_ratio",
                self.rules.independent_child_solo_ratio,
            ),
            (
                "rules.mutable_child_write_ratio",
                self.rules.mutable_child_write_ratio,
            ),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Load config from `<dir>/schema-travels.toml`, falling back to
/// `<dir>/.schema-travels/schema-travels.toml`.
pub fn load_config(dir: &Path) -> Result<EngineConfig, EngineError> {
    let candidates = [
        dir.join(CONFIG_FILE_NAME),
        dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME),
    ];

    for config_path in candidates {
        if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(EngineError::Io)?;
            log::debug!("loading config from {}", config_path.display());
            return EngineConfig::from_toml_str(&content);
        }
    }

    // No config = defaults (not an error)
    Ok(EngineConfig::default())
}
