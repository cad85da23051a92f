//! Manipulation pattern catalog.
//!
//! A pattern matches when every one of its feature thresholds holds. The
//! catalog is built once from `PatternConfig` and is read-only afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PatternConfig;
use crate::features::{BehavioralFeatures, Feature};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternId {
    FlashLoanAttack,
    CoordinatedAttack,
    GradualDrift,
    FrontRunning,
}

impl PatternId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlashLoanAttack => "flash_loan_attack",
            Self::CoordinatedAttack => "coordinated_attack",
            Self::GradualDrift => "gradual_drift",
            Self::FrontRunning => "front_running",
        }
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    #[inline]
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
        }
    }
}

/// One condition on one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureThreshold {
    pub feature: Feature,
    pub op: Comparison,
    pub value: f64,
}

impl FeatureThreshold {
    pub fn new(feature: Feature, op: Comparison, value: f64) -> Self {
        Self { feature, op, value }
    }

    pub fn is_met(&self, features: &BehavioralFeatures) -> bool {
        self.op.holds(features.get(self.feature), self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManipulationPattern {
    pub id: PatternId,
    pub severity: Severity,
    /// Fixed confidence attached to every match of this pattern.
    pub confidence: f64,
    pub required_features: Vec<FeatureThreshold>,
}

impl ManipulationPattern {
    pub fn matches(&self, features: &BehavioralFeatures) -> bool {
        !self.required_features.is_empty()
            && self.required_features.iter().all(|t| t.is_met(features))
    }
}

/// A pattern that fired for a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub id: PatternId,
    pub severity: Severity,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct PatternCatalog {
    patterns: Vec<ManipulationPattern>,
}

impl PatternCatalog {
    /// Build the standard catalog from configuration.
    pub fn from_config(config: &PatternConfig) -> Self {
        use Comparison::{Ge, Gt, Le, Lt};
        use Feature::*;

        let f = &config.flash_loan;
        let c = &config.coordinated;
        let d = &config.drift;
        let r = &config.front_running;

        let patterns = vec![
            ManipulationPattern {
                id: PatternId::FlashLoanAttack,
                severity: Severity::Critical,
                confidence: f.confidence,
                required_features: vec![
                    FeatureThreshold::new(PriceVolatility, Gt, f.min_volatility),
                    FeatureThreshold::new(TransactionClustering, Gt, f.min_clustering),
                    FeatureThreshold::new(TemporalAnomaly, Gt, f.min_temporal_anomaly),
                ],
            },
            ManipulationPattern {
                id: PatternId::CoordinatedAttack,
                severity: Severity::Critical,
                confidence: c.confidence,
                required_features: vec![
                    FeatureThreshold::new(CrossSourceDeviation, Gt, c.min_deviation),
                    FeatureThreshold::new(DistinctSources, Ge, c.min_sources as f64),
                    FeatureThreshold::new(MinSourceConfidence, Lt, c.confidence_floor),
                ],
            },
            ManipulationPattern {
                id: PatternId::GradualDrift,
                severity: Severity::High,
                confidence: d.confidence,
                required_features: vec![
                    FeatureThreshold::new(PriceVolatility, Lt, d.max_volatility),
                    FeatureThreshold::new(CrossSourceDeviation, Gt, d.min_deviation),
                    FeatureThreshold::new(SustainedDriftWindows, Ge, f64::from(d.windows)),
                ],
            },
            ManipulationPattern {
                id: PatternId::FrontRunning,
                severity: Severity::High,
                confidence: r.confidence,
                required_features: vec![
                    FeatureThreshold::new(TemporalAnomaly, Ge, r.min_temporal_anomaly),
                    FeatureThreshold::new(TransactionClustering, Ge, r.min_clustering),
                    FeatureThreshold::new(TransactionClustering, Le, r.max_clustering),
                    FeatureThreshold::new(NetworkCongestion, Ge, r.min_congestion),
                ],
            },
        ];
        Self { patterns }
    }

    pub fn patterns(&self) -> &[ManipulationPattern] {
        &self.patterns
    }

    /// Every matching pattern, in catalog order.
    pub fn matches(&self, features: &BehavioralFeatures) -> Vec<PatternMatch> {
        self.patterns
            .iter()
            .filter(|p| p.matches(features))
            .map(|p| PatternMatch {
                id: p.id,
                severity: p.severity,
                confidence: p.confidence,
            })
            .collect()
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::from_config(&PatternConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PatternCatalog {
        PatternCatalog::default()
    }

    #[test]
    fn test_quiet_window_matches_nothing() {
        assert!(catalog().matches(&BehavioralFeatures::default()).is_empty());
    }

    #[test]
    fn test_flash_loan_thresholds_are_strict() {
        let mut features = BehavioralFeatures {
            price_volatility: 0.15,
            transaction_clustering: 0.6,
            temporal_anomaly: 0.4,
            ..Default::default()
        };
        let matched = catalog().matches(&features);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, PatternId::FlashLoanAttack);
        assert_eq!(matched[0].severity, Severity::Critical);

        features.price_volatility = 0.10;
        assert!(catalog().matches(&features).is_empty());
    }

    #[test]
    fn test_coordinated_attack_needs_low_confidence_source() {
        let mut features = BehavioralFeatures {
            cross_source_deviation: 0.08,
            distinct_sources: 4,
            min_source_confidence: 0.9,
            ..Default::default()
        };
        assert!(catalog().matches(&features).is_empty());

        features.min_source_confidence = 0.5;
        let ids: Vec<PatternId> = catalog().matches(&features).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![PatternId::CoordinatedAttack]);
    }

    #[test]
    fn test_gradual_drift_requires_streak() {
        let mut features = BehavioralFeatures {
            price_volatility: 0.005,
            cross_source_deviation: 0.03,
            sustained_drift_windows: 2,
            ..Default::default()
        };
        assert!(catalog().matches(&features).is_empty());
        features.sustained_drift_windows = 3;
        assert_eq!(catalog().matches(&features)[0].id, PatternId::GradualDrift);
    }

    #[test]
    fn test_front_running_moderate_clustering_band() {
        let mut features = BehavioralFeatures {
            temporal_anomaly: 0.6,
            transaction_clustering: 0.5,
            network_congestion: 0.5,
            ..Default::default()
        };
        assert_eq!(catalog().matches(&features)[0].id, PatternId::FrontRunning);

        features.transaction_clustering = 0.9;
        assert!(catalog().matches(&features).is_empty());
    }

    #[test]
    fn test_simultaneous_matches_all_reported() {
        let features = BehavioralFeatures {
            price_volatility: 0.2,
            transaction_clustering: 0.6,
            temporal_anomaly: 0.9,
            cross_source_deviation: 0.2,
            distinct_sources: 3,
            min_source_confidence: 0.3,
            network_congestion: 0.0,
            ..Default::default()
        };
        let ids: Vec<PatternId> = catalog().matches(&features).iter().map(|m| m.id).collect();
        assert_eq!(
            ids,
            vec![PatternId::FlashLoanAttack, PatternId::CoordinatedAttack]
        );
    }
}
