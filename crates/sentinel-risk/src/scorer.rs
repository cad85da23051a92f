//! Risk scorer.
//!
//! ```text
//! risk = w_pattern * min(1, Σ severity_weight × confidence)
//!      + w_rule    * Σ rule.weight × level(rule.feature) / Σ rule.weight
//!      + w_feature * max level(rule.feature)
//! level(f) = min(1, value(f) / alarm_level(f))
//! ```
//!
//! The result is clamped to [0, 1] and mapped to an action with `>=` crossings.
//! The scorer only recommends; executing a circuit breaker is up to the caller.

use std::fmt;

use chrono::{DateTime, Utc};
use sentinel_core::AssetId;
use sentinel_detector::{BehavioralFeatures, PatternId, PatternMatch, Severity};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::RiskConfig;
use crate::error::RiskResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    #[default]
    None,
    Alert,
    CircuitBreaker,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Alert => "alert",
            Self::CircuitBreaker => "circuit_breaker",
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component scores before weighting.
///
/// `rule_score` and `raw_feature_score` lie in [0, 1]. `pattern_score` is the
/// uncapped sum over matches, so stacked patterns keep adding risk until the
/// final score clamps.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub pattern_score: f64,
    pub rule_score: f64,
    pub raw_feature_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// `{asset}:{window_end_ms}`; stable across re-evaluations of the same window.
    pub assessment_id: String,
    pub asset: AssetId,
    pub risk_score: f64,
    pub matched_patterns: Vec<PatternId>,
    /// Highest severity among matched patterns.
    pub max_severity: Option<Severity>,
    pub recommended_action: RecommendedAction,
    pub breakdown: ScoreBreakdown,
    /// End of the evaluated window.
    pub timestamp: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn identity(asset: &AssetId, timestamp: DateTime<Utc>) -> String {
        format!("{}:{}", asset, timestamp.timestamp_millis())
    }
}

pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    /// Create a scorer, rejecting invalid configuration.
    pub fn new(config: RiskConfig) -> RiskResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Score one analyzed window.
    pub fn score(
        &self,
        asset: &AssetId,
        features: &BehavioralFeatures,
        matched: &[PatternMatch],
        timestamp: DateTime<Utc>,
    ) -> RiskAssessment {
        let breakdown = self.breakdown(features, matched);
        let w = &self.config.weights;
        let raw = w.pattern * breakdown.pattern_score
            + w.rule * breakdown.rule_score
            + w.feature * breakdown.raw_feature_score;
        let risk_score = if raw.is_finite() {
            raw.clamp(0.0, 1.0)
        } else {
            1.0
        };

        let (alert, breaker) = self.config.thresholds_for(asset);
        let recommended_action = if risk_score >= breaker {
            RecommendedAction::CircuitBreaker
        } else if risk_score >= alert {
            RecommendedAction::Alert
        } else {
            RecommendedAction::None
        };

        let assessment = RiskAssessment {
            assessment_id: RiskAssessment::identity(asset, timestamp),
            asset: asset.clone(),
            risk_score,
            matched_patterns: matched.iter().map(|m| m.id).collect(),
            max_severity: matched.iter().map(|m| m.severity).max(),
            recommended_action,
            breakdown,
            timestamp,
        };

        match recommended_action {
            RecommendedAction::CircuitBreaker => error!(
                %asset,
                score = risk_score,
                patterns = ?assessment.matched_patterns,
                "Circuit breaker recommended"
            ),
            RecommendedAction::Alert => warn!(
                %asset,
                score = risk_score,
                patterns = ?assessment.matched_patterns,
                "Risk alert"
            ),
            RecommendedAction::None => debug!(%asset, score = risk_score, "Risk assessed"),
        }

        assessment
    }

    fn breakdown(&self, features: &BehavioralFeatures, matched: &[PatternMatch]) -> ScoreBreakdown {
        let severity = &self.config.severity_weights;
        let pattern_score = matched
            .iter()
            .map(|m| severity.weight(m.severity) * m.confidence)
            .sum::<f64>();

        let levels: Vec<(f64, f64)> = self
            .config
            .rules
            .iter()
            .map(|r| {
                let level = (features.get(r.feature) / r.alarm_level).clamp(0.0, 1.0);
                (level, r.weight)
            })
            .collect();
        let total_weight: f64 = levels.iter().map(|(_, w)| w).sum();
        let rule_score = if total_weight > 0.0 {
            levels.iter().map(|(l, w)| l * w).sum::<f64>() / total_weight
        } else {
            0.0
        };
        let raw_feature_score = levels.iter().map(|(l, _)| *l).fold(0.0, f64::max);

        ScoreBreakdown {
            pattern_score,
            rule_score,
            raw_feature_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdOverride;
    use chrono::TimeZone;

    fn asset() -> AssetId {
        AssetId::new("cUSD").unwrap()
    }

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn flash_match() -> PatternMatch {
        PatternMatch {
            id: PatternId::FlashLoanAttack,
            severity: Severity::Critical,
            confidence: 0.95,
        }
    }

    #[test]
    fn test_quiet_window_scores_zero() {
        let scorer = RiskScorer::new(RiskConfig::default()).unwrap();
        let a = scorer.score(&asset(), &BehavioralFeatures::default(), &[], ts());
        assert_eq!(a.risk_score, 0.0);
        assert_eq!(a.recommended_action, RecommendedAction::None);
        assert!(a.max_severity.is_none());
    }

    #[test]
    fn test_flash_loan_trips_circuit_breaker() {
        let scorer = RiskScorer::new(RiskConfig::default()).unwrap();
        let features = BehavioralFeatures {
            price_volatility: 0.108,
            transaction_clustering: 0.667,
            temporal_anomaly: 1.0,
            distinct_sources: 2,
            ..Default::default()
        };
        let a = scorer.score(&asset(), &features, &[flash_match()], ts());
        // 0.4 * 0.95 + 0.4 * 0.70 + 0.2 * 1.0
        assert!((a.risk_score - 0.86).abs() < 1e-9, "score {}", a.risk_score);
        assert_eq!(a.recommended_action, RecommendedAction::CircuitBreaker);
        assert_eq!(a.matched_patterns, vec![PatternId::FlashLoanAttack]);
        assert_eq!(a.max_severity, Some(Severity::Critical));
    }

    #[test]
    fn test_alert_band() {
        let scorer = RiskScorer::new(RiskConfig::default()).unwrap();
        // Volatility alone at alarm level: 0.4 * 0.35 + 0.2 * 1.0 = 0.34
        let features = BehavioralFeatures {
            price_volatility: 0.10,
            ..Default::default()
        };
        let a = scorer.score(&asset(), &features, &[], ts());
        assert_eq!(a.recommended_action, RecommendedAction::None);

        // Adding full clustering: + 0.4 * 0.2 = 0.42
        let features = BehavioralFeatures {
            price_volatility: 0.10,
            transaction_clustering: 1.0,
            ..Default::default()
        };
        let a = scorer.score(&asset(), &features, &[], ts());
        assert!((a.risk_score - 0.42).abs() < 1e-9);
        assert_eq!(a.recommended_action, RecommendedAction::Alert);
    }

    #[test]
    fn test_threshold_crossing_is_inclusive() {
        let config = RiskConfig {
            alert_threshold: 0.2,
            ..Default::default()
        };
        let scorer = RiskScorer::new(config).unwrap();
        // 0.4 * 0.1 + 0.2 * 1.0 = 0.24
        let features = BehavioralFeatures {
            source_count_drop: 0.5,
            ..Default::default()
        };
        let a = scorer.score(&asset(), &features, &[], ts());
        assert!(a.risk_score >= 0.2);
        assert_eq!(a.recommended_action, RecommendedAction::Alert);
    }

    #[test]
    fn test_stacked_patterns_saturate_final_score() {
        let scorer = RiskScorer::new(RiskConfig::default()).unwrap();
        let matches = vec![flash_match(), flash_match(), flash_match()];
        let a = scorer.score(&asset(), &BehavioralFeatures::default(), &matches, ts());
        assert!((a.breakdown.pattern_score - 2.85).abs() < 1e-9);
        assert_eq!(a.risk_score, 1.0);
        assert_eq!(a.recommended_action, RecommendedAction::CircuitBreaker);
    }

    #[test]
    fn test_coordinated_drift_escalates_to_circuit_breaker() {
        let scorer = RiskScorer::new(RiskConfig::default()).unwrap();
        let features = BehavioralFeatures {
            price_volatility: 0.01,
            cross_source_deviation: 0.06,
            distinct_sources: 3,
            min_source_confidence: 0.5,
            sustained_drift_windows: 3,
            ..Default::default()
        };
        let matches = vec![
            PatternMatch {
                id: PatternId::CoordinatedAttack,
                severity: Severity::Critical,
                confidence: 0.9,
            },
            PatternMatch {
                id: PatternId::GradualDrift,
                severity: Severity::High,
                confidence: 0.8,
            },
        ];
        let a = scorer.score(&asset(), &features, &matches, ts());
        // 0.4 * (0.9 + 0.64) + 0.4 * (0.35 * 0.1 + 0.2 * 1.0) + 0.2 * 1.0
        assert!((a.breakdown.pattern_score - 1.54).abs() < 1e-9);
        assert!((a.risk_score - 0.91).abs() < 1e-9, "score {}", a.risk_score);
        assert_eq!(a.recommended_action, RecommendedAction::CircuitBreaker);
        assert_eq!(a.max_severity, Some(Severity::Critical));
    }

    #[test]
    fn test_per_asset_override_tightens_action() {
        let mut config = RiskConfig::default();
        config.asset_overrides.insert(
            "cUSD".to_string(),
            ThresholdOverride {
                alert_threshold: Some(0.1),
                circuit_breaker_threshold: Some(0.3),
            },
        );
        let scorer = RiskScorer::new(config).unwrap();
        let features = BehavioralFeatures {
            price_volatility: 0.10,
            ..Default::default()
        };
        let cusd = scorer.score(&asset(), &features, &[], ts());
        assert_eq!(cusd.recommended_action, RecommendedAction::CircuitBreaker);

        let celo = AssetId::new("CELO").unwrap();
        let other = scorer.score(&celo, &features, &[], ts());
        assert_eq!(other.recommended_action, RecommendedAction::None);
    }

    #[test]
    fn test_assessment_id_is_stable() {
        let scorer = RiskScorer::new(RiskConfig::default()).unwrap();
        let a = scorer.score(&asset(), &BehavioralFeatures::default(), &[], ts());
        let b = scorer.score(&asset(), &BehavioralFeatures::default(), &[], ts());
        assert_eq!(a.assessment_id, "cUSD:1700000000000");
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RiskConfig {
            circuit_breaker_threshold: 1.5,
            ..Default::default()
        };
        assert!(RiskScorer::new(config).is_err());
    }
}
