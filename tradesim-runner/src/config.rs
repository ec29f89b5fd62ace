//! Serializable run configuration.
//!
//! A run is described by one TOML file:
//!
//! ```toml
//! [dataset]
//! path = "data/btc_1m.csv"
//! interval = "1m"
//! symbols = ["BTCUSDT"]
//!
//! [broker]
//! commission_rate = 0.001
//! time_discount_factor = 0.99
//!
//! [episodes]
//! episodes = 16
//! master_seed = 42
//! rollback_periods = 32
//! random_start = true
//! max_steps = 500
//!
//! [strategy]
//! stop_loss_pct = 0.02
//! risk_reward = 1.5
//! ```

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tradesim_core::BrokerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid interval '{value}': {reason}")]
    Interval { value: String, reason: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Everything needed to reproduce a batch of episodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub episodes: EpisodeConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetConfig {
    pub path: PathBuf,
    /// Human-readable candle interval, e.g. "1m", "15m", "4h", "1day".
    pub interval: String,
    /// Symbols required at every timestamp. Empty means every symbol found.
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EpisodeConfig {
    pub episodes: u64,
    pub master_seed: u64,
    /// Periods reserved before the first step; also the observation lookback.
    pub rollback_periods: usize,
    pub random_start: bool,
    pub max_steps: Option<usize>,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            episodes: 1,
            master_seed: 0,
            rollback_periods: 0,
            random_start: false,
            max_steps: None,
        }
    }
}

/// Parameters of the scripted bracket strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    /// Symbol to trade; defaults to the first tracked symbol.
    pub symbol: Option<String>,
    pub stop_loss_pct: f64,
    pub risk_reward: f64,
    pub quantity: f64,
    pub leverage: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: None,
            stop_loss_pct: 0.02,
            risk_reward: 1.5,
            quantity: 1.0,
            leverage: 1.0,
        }
    }
}

impl RunConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Candle interval parsed from its human-readable form.
    pub fn interval(&self) -> Result<TimeDelta, ConfigError> {
        parse_interval(&self.dataset.interval)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interval()?;
        self.broker.validate().map_err(|e| ConfigError::Invalid {
            field: "broker",
            reason: e.to_string(),
        })?;

        if self.episodes.episodes == 0 {
            return Err(invalid("episodes.episodes", "must be at least 1"));
        }
        if self.episodes.max_steps == Some(0) {
            return Err(invalid("episodes.max_steps", "must be at least 1 when set"));
        }

        let s = &self.strategy;
        if !(s.stop_loss_pct > 0.0 && s.stop_loss_pct < 1.0) {
            return Err(invalid("strategy.stop_loss_pct", "must be in (0, 1)"));
        }
        if !(s.risk_reward.is_finite() && s.risk_reward > 0.0) {
            return Err(invalid("strategy.risk_reward", "must be positive"));
        }
        if !(s.quantity.is_finite() && s.quantity > 0.0) {
            return Err(invalid("strategy.quantity", "must be positive"));
        }
        if !(s.leverage.is_finite() && s.leverage > 0.0) {
            return Err(invalid("strategy.leverage", "must be positive"));
        }
        if let Some(symbol) = &s.symbol {
            if !self.dataset.symbols.is_empty() && !self.dataset.symbols.contains(symbol) {
                return Err(ConfigError::Invalid {
                    field: "strategy.symbol",
                    reason: format!("'{symbol}' is not in dataset.symbols"),
                });
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Parse "1m", "15min", "4h", "1day" and similar into a positive interval.
pub fn parse_interval(value: &str) -> Result<TimeDelta, ConfigError> {
    let err = |reason: String| ConfigError::Interval {
        value: value.to_string(),
        reason,
    };
    let duration = humantime::parse_duration(value.trim()).map_err(|e| err(e.to_string()))?;
    let delta = TimeDelta::from_std(duration).map_err(|e| err(e.to_string()))?;
    if delta.num_milliseconds() <= 0 {
        return Err(err("interval must be at least one millisecond".into()));
    }
    Ok(delta)
}
