//! Engine configuration.
//!
//! Loaded from a TOML file layered with `SENTINEL__SECTION__KEY` environment
//! variables. Every section falls back to its component defaults.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use sentinel_core::AssetId;
use sentinel_detector::{ConsensusConfig, PatternConfig};
use sentinel_feed::{HealthConfig, StoreConfig};
use sentinel_proof::ProofConfig;
use sentinel_risk::RiskConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Feed poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Poll interval (ms). Default: 5,000.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Per-fetch timeout (ms). Default: 2,000.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Assets polled on every fetcher.
    #[serde(default)]
    pub assets: Vec<String>,
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_fetch_timeout_ms() -> u64 {
    2_000
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            assets: Vec::new(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn asset_ids(&self) -> EngineResult<Vec<AssetId>> {
        self.assets
            .iter()
            .map(|a| AssetId::new(a.as_str()).map_err(EngineError::from))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub detector: PatternConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub proof: ProofConfig,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub poller: PollerConfig,
}

/// Evaluation windows and alert plumbing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Evaluation window (ms). Default: 300,000 (5 minutes).
    #[serde(default = "default_window_size_ms")]
    pub window_size_ms: u64,
    /// Window used for the source-count baseline (ms). Default: 3,600,000.
    #[serde(default = "default_baseline_window_size_ms")]
    pub baseline_window_size_ms: u64,
    /// Capacity of each alert subscription channel. Default: 1,024.
    #[serde(default = "default_alert_channel_capacity")]
    pub alert_channel_capacity: usize,
}

fn default_window_size_ms() -> u64 {
    300_000
}

fn default_baseline_window_size_ms() -> u64 {
    3_600_000
}

fn default_alert_channel_capacity() -> usize {
    1024
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            window_size_ms: default_window_size_ms(),
            baseline_window_size_ms: default_baseline_window_size_ms(),
            alert_channel_capacity: default_alert_channel_capacity(),
        }
    }
}

impl EngineSection {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_size_ms)
    }

    pub fn baseline_window(&self) -> Duration {
        Duration::from_millis(self.baseline_window_size_ms)
    }
}

impl EngineConfig {
    /// Load from a TOML file plus `SENTINEL__*` environment overrides.
    ///
    /// A missing file falls back to defaults with a warning.
    pub fn load(path: &str) -> EngineResult<Self> {
        if !Path::new(path).exists() {
            warn!(path = %path, "Config file not found, using defaults");
        }
        let config: Self = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(Environment::with_prefix("SENTINEL").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without environment layering.
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.store.validate()?;
        self.consensus.validate()?;
        self.health.validate()?;
        self.detector.validate()?;
        self.risk.validate()?;
        self.proof.validate()?;
        self.poller.asset_ids()?;

        if self.engine.window_size_ms == 0 {
            return Err(EngineError::Config(
                "engine.window_size_ms must be positive".to_string(),
            ));
        }
        if self.engine.baseline_window_size_ms < self.engine.window_size_ms {
            return Err(EngineError::Config(format!(
                "engine.baseline_window_size_ms ({}) must be >= window_size_ms ({})",
                self.engine.baseline_window_size_ms, self.engine.window_size_ms
            )));
        }
        if self.engine.alert_channel_capacity == 0 {
            return Err(EngineError::Config(
                "engine.alert_channel_capacity must be positive".to_string(),
            ));
        }
        if self.poller.interval_ms == 0 || self.poller.fetch_timeout_ms == 0 {
            return Err(EngineError::Config(
                "poller intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
