//! Consensus and pattern configuration.
//!
//! Pattern constants are calibration defaults, not ground truth. Operators
//! are expected to tune them against historical incident data.

use rust_decimal::Decimal;
use sentinel_core::ConsensusMethod;
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, DetectorResult};

/// Configuration for the consensus calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Minimum distinct sources for a consensus price.
    #[serde(default = "default_min_sources")]
    pub min_sources: usize,
    /// Fraction trimmed from each end for `TrimmedMean`.
    #[serde(default = "default_trim_fraction")]
    pub trim_fraction: Decimal,
    /// Method used by query interfaces that don't name one.
    #[serde(default)]
    pub default_method: ConsensusMethod,
}

fn default_min_sources() -> usize {
    3
}

fn default_trim_fraction() -> Decimal {
    Decimal::new(1, 1) // 10%
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_sources: default_min_sources(),
            trim_fraction: default_trim_fraction(),
            default_method: ConsensusMethod::default(),
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> DetectorResult<()> {
        if self.min_sources == 0 {
            return Err(DetectorError::ConfigError(
                "consensus.min_sources must be at least 1".to_string(),
            ));
        }
        if self.trim_fraction.is_sign_negative() || self.trim_fraction >= Decimal::new(5, 1) {
            return Err(DetectorError::ConfigError(format!(
                "consensus.trim_fraction ({}) must be within [0, 0.5)",
                self.trim_fraction
            )));
        }
        Ok(())
    }
}

/// Price spiked and reverted within the same block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashLoanConfig {
    pub min_volatility: f64,
    pub min_clustering: f64,
    pub min_temporal_anomaly: f64,
    pub confidence: f64,
}

impl Default for FlashLoanConfig {
    fn default() -> Self {
        Self {
            min_volatility: 0.10,
            min_clustering: 0.5,
            min_temporal_anomaly: 0.3,
            confidence: 0.95,
        }
    }
}

/// Several sources pushed away from consensus at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatedAttackConfig {
    pub min_deviation: f64,
    pub min_sources: usize,
    /// Triggers when any source reports confidence below this.
    pub confidence_floor: f64,
    pub confidence: f64,
}

impl Default for CoordinatedAttackConfig {
    fn default() -> Self {
        Self {
            min_deviation: 0.05,
            min_sources: 3,
            confidence_floor: 0.7,
            confidence: 0.9,
        }
    }
}

/// Low volatility, persistent cross-source offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradualDriftConfig {
    pub max_volatility: f64,
    pub min_deviation: f64,
    /// Consecutive evaluation windows the drift must persist.
    pub windows: u32,
    pub confidence: f64,
}

impl Default for GradualDriftConfig {
    fn default() -> Self {
        Self {
            max_volatility: 0.02,
            min_deviation: 0.02,
            windows: 3,
            confidence: 0.8,
        }
    }
}

/// Irregular timing, moderate same-block clustering, out-of-order blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontRunningConfig {
    pub min_temporal_anomaly: f64,
    pub min_clustering: f64,
    pub max_clustering: f64,
    pub min_congestion: f64,
    pub confidence: f64,
}

impl Default for FrontRunningConfig {
    fn default() -> Self {
        Self {
            min_temporal_anomaly: 0.5,
            min_clustering: 0.3,
            max_clustering: 0.7,
            min_congestion: 0.3,
            confidence: 0.7,
        }
    }
}

/// Thresholds and confidences for the pattern catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    #[serde(default)]
    pub flash_loan: FlashLoanConfig,
    #[serde(default)]
    pub coordinated: CoordinatedAttackConfig,
    #[serde(default)]
    pub drift: GradualDriftConfig,
    #[serde(default)]
    pub front_running: FrontRunningConfig,
}

fn check_unit(name: &str, value: f64) -> DetectorResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(DetectorError::ConfigError(format!(
            "detector.{name} ({value}) must be within [0, 1]"
        )));
    }
    Ok(())
}

impl PatternConfig {
    pub fn validate(&self) -> DetectorResult<()> {
        let f = &self.flash_loan;
        check_unit("flash_loan.min_volatility", f.min_volatility)?;
        check_unit("flash_loan.min_clustering", f.min_clustering)?;
        check_unit("flash_loan.min_temporal_anomaly", f.min_temporal_anomaly)?;
        check_unit("flash_loan.confidence", f.confidence)?;

        let c = &self.coordinated;
        check_unit("coordinated.min_deviation", c.min_deviation)?;
        check_unit("coordinated.confidence_floor", c.confidence_floor)?;
        check_unit("coordinated.confidence", c.confidence)?;

        let d = &self.drift;
        check_unit("drift.max_volatility", d.max_volatility)?;
        check_unit("drift.min_deviation", d.min_deviation)?;
        check_unit("drift.confidence", d.confidence)?;
        if d.windows == 0 {
            return Err(DetectorError::ConfigError(
                "detector.drift.windows must be at least 1".to_string(),
            ));
        }

        let r = &self.front_running;
        check_unit("front_running.min_temporal_anomaly", r.min_temporal_anomaly)?;
        check_unit("front_running.min_clustering", r.min_clustering)?;
        check_unit("front_running.max_clustering", r.max_clustering)?;
        check_unit("front_running.min_congestion", r.min_congestion)?;
        check_unit("front_running.confidence", r.confidence)?;
        if r.min_clustering > r.max_clustering {
            return Err(DetectorError::ConfigError(format!(
                "detector.front_running.min_clustering ({}) exceeds max_clustering ({})",
                r.min_clustering, r.max_clustering
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_validate() {
        assert!(ConsensusConfig::default().validate().is_ok());
        assert!(PatternConfig::default().validate().is_ok());
        assert_eq!(ConsensusConfig::default().trim_fraction, dec!(0.1));
    }

    #[test]
    fn test_trim_fraction_bounds() {
        let config = ConsensusConfig {
            trim_fraction: dec!(0.5),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_pattern_config_uses_defaults() {
        let config: PatternConfig =
            serde_json::from_str(r#"{ "flash_loan": { "min_volatility": 0.2 } }"#).unwrap();
        assert_eq!(config.flash_loan.min_volatility, 0.2);
        assert_eq!(config.flash_loan.min_clustering, 0.5);
        assert_eq!(config.drift.windows, 3);
    }

    #[test]
    fn test_inverted_clustering_band_rejected() {
        let mut config = PatternConfig::default();
        config.front_running.min_clustering = 0.8;
        assert!(config.validate().is_err());
    }
}
