//! Risk scorer configuration.
//!
//! All thresholds and weights are configuration. Pegged assets usually want
//! tighter action thresholds than volatile ones, via `asset_overrides`.

use std::collections::BTreeMap;

use sentinel_core::AssetId;
use sentinel_detector::{Feature, Severity};
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// Weights of the three score components. Should sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentWeights {
    pub pattern: f64,
    pub rule: f64,
    pub feature: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            pattern: 0.4,
            rule: 0.4,
            feature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityWeights {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            low: 0.2,
            medium: 0.5,
            high: 0.8,
            critical: 1.0,
        }
    }
}

impl SeverityWeights {
    pub fn weight(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
            Severity::Critical => self.critical,
        }
    }
}

/// One row of the rule table.
///
/// The feature's level is `value / alarm_level`, saturated at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub feature: Feature,
    pub alarm_level: f64,
    pub weight: f64,
}

impl RuleEntry {
    pub fn new(feature: Feature, alarm_level: f64, weight: f64) -> Self {
        Self {
            feature,
            alarm_level,
            weight,
        }
    }
}

fn default_rules() -> Vec<RuleEntry> {
    vec![
        RuleEntry::new(Feature::PriceVolatility, 0.10, 0.35),
        RuleEntry::new(Feature::TransactionClustering, 0.5, 0.20),
        RuleEntry::new(Feature::CrossSourceDeviation, 0.05, 0.20),
        RuleEntry::new(Feature::TemporalAnomaly, 0.5, 0.15),
        RuleEntry::new(Feature::SourceCountDrop, 0.5, 0.10),
    ]
}

/// Action thresholds replacing the global ones for one asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdOverride {
    #[serde(default)]
    pub alert_threshold: Option<f64>,
    #[serde(default)]
    pub circuit_breaker_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Score at or above which an Alert is recommended.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    /// Score at or above which a CircuitBreaker is recommended.
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: f64,

    #[serde(default)]
    pub weights: ComponentWeights,

    #[serde(default)]
    pub severity_weights: SeverityWeights,

    #[serde(default = "default_rules")]
    pub rules: Vec<RuleEntry>,

    /// Keyed by asset id.
    #[serde(default)]
    pub asset_overrides: BTreeMap<String, ThresholdOverride>,
}

fn default_alert_threshold() -> f64 {
    0.4
}
fn default_circuit_breaker_threshold() -> f64 {
    0.75
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            weights: ComponentWeights::default(),
            severity_weights: SeverityWeights::default(),
            rules: default_rules(),
            asset_overrides: BTreeMap::new(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> RiskResult<()> {
        check_thresholds("risk", self.alert_threshold, self.circuit_breaker_threshold)?;

        let w = &self.weights;
        for (name, v) in [("pattern", w.pattern), ("rule", w.rule), ("feature", w.feature)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(RiskError::ConfigError(format!(
                    "risk.weights.{name} ({v}) must be within [0, 1]"
                )));
            }
        }
        let total = w.pattern + w.rule + w.feature;
        if (total - 1.0).abs() > 1e-6 {
            return Err(RiskError::ConfigError(format!(
                "risk.weights must sum to 1, got {total}"
            )));
        }

        for rule in &self.rules {
            if rule.alarm_level <= 0.0 || rule.weight < 0.0 {
                return Err(RiskError::ConfigError(format!(
                    "risk.rules.{}: alarm_level must be positive and weight non-negative",
                    rule.feature
                )));
            }
        }

        for (asset, o) in &self.asset_overrides {
            let (alert, breaker) = self.resolve(o);
            check_thresholds(&format!("risk.asset_overrides.{asset}"), alert, breaker)?;
        }
        Ok(())
    }

    fn resolve(&self, o: &ThresholdOverride) -> (f64, f64) {
        (
            o.alert_threshold.unwrap_or(self.alert_threshold),
            o.circuit_breaker_threshold
                .unwrap_or(self.circuit_breaker_threshold),
        )
    }

    /// `(alert, circuit_breaker)` thresholds in force for `asset`.
    pub fn thresholds_for(&self, asset: &AssetId) -> (f64, f64) {
        let found = self.asset_overrides.get(asset.as_str()).or_else(|| {
            // Environment-sourced keys may arrive lowercased.
            self.asset_overrides
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(asset.as_str()))
                .map(|(_, v)| v)
        });
        match found {
            Some(o) => self.resolve(o),
            None => (self.alert_threshold, self.circuit_breaker_threshold),
        }
    }
}

fn check_thresholds(scope: &str, alert: f64, breaker: f64) -> RiskResult<()> {
    if !(0.0..=1.0).contains(&alert) || !(0.0..=1.0).contains(&breaker) {
        return Err(RiskError::ConfigError(format!(
            "{scope}: thresholds must be within [0, 1] (alert {alert}, circuit_breaker {breaker})"
        )));
    }
    if alert > breaker {
        return Err(RiskError::ConfigError(format!(
            "{scope}: alert_threshold ({alert}) exceeds circuit_breaker_threshold ({breaker})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = RiskConfig::default();
        assert!(config.validate().is_ok());
        let rule_total: f64 = config.rules.iter().map(|r| r.weight).sum();
        assert!((rule_total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_asset_override_thresholds() {
        let mut config = RiskConfig::default();
        config.asset_overrides.insert(
            "cUSD".to_string(),
            ThresholdOverride {
                alert_threshold: Some(0.2),
                circuit_breaker_threshold: None,
            },
        );
        let cusd = AssetId::new("cUSD").unwrap();
        let celo = AssetId::new("CELO").unwrap();
        assert_eq!(config.thresholds_for(&cusd), (0.2, 0.75));
        assert_eq!(config.thresholds_for(&celo), (0.4, 0.75));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_override_lookup_ignores_case() {
        let mut config = RiskConfig::default();
        config.asset_overrides.insert(
            "cusd".to_string(),
            ThresholdOverride {
                alert_threshold: None,
                circuit_breaker_threshold: Some(0.5),
            },
        );
        let cusd = AssetId::new("cUSD").unwrap();
        assert_eq!(config.thresholds_for(&cusd), (0.4, 0.5));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = RiskConfig {
            alert_threshold: 0.8,
            circuit_breaker_threshold: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config = RiskConfig {
            weights: ComponentWeights {
                pattern: 0.5,
                rule: 0.5,
                feature: 0.5,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rule_table_deserializes() {
        let json = r#"{ "rules": [ { "feature": "price_volatility", "alarm_level": 0.05, "weight": 1.0 } ] }"#;
        let config: RiskConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].feature, Feature::PriceVolatility);
        assert_eq!(config.alert_threshold, 0.4);
    }
}
