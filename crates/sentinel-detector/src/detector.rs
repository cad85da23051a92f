//! Manipulation pattern detector.
//!
//! Stateless given its input: everything the detector needs that spans more
//! than one window (baseline source count, drift streak) is passed in by the
//! caller through `AnalysisWindow`.

use sentinel_core::PriceObservation;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::PatternConfig;
use crate::consensus::latest_per_source;
use crate::features::{self, BehavioralFeatures};
use crate::patterns::{PatternCatalog, PatternMatch};

/// Observations of one asset plus the cross-window context.
#[derive(Debug, Clone, Default)]
pub struct AnalysisWindow {
    pub observations: Vec<PriceObservation>,
    /// Distinct sources seen over the trailing baseline window.
    pub baseline_source_count: Option<usize>,
    /// Consecutive preceding windows that showed drift.
    pub prior_drift_windows: u32,
}

impl AnalysisWindow {
    pub fn new(observations: Vec<PriceObservation>) -> Self {
        Self {
            observations,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_baseline(mut self, baseline_source_count: usize) -> Self {
        self.baseline_source_count = Some(baseline_source_count);
        self
    }

    #[must_use]
    pub fn with_prior_drift(mut self, prior_drift_windows: u32) -> Self {
        self.prior_drift_windows = prior_drift_windows;
        self
    }
}

/// Detector output for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub features: BehavioralFeatures,
    pub matched: Vec<PatternMatch>,
}

impl Analysis {
    pub fn is_clean(&self) -> bool {
        self.matched.is_empty()
    }
}

pub struct ManipulationDetector {
    config: PatternConfig,
    catalog: PatternCatalog,
}

impl ManipulationDetector {
    pub fn new(config: PatternConfig) -> Self {
        let catalog = PatternCatalog::from_config(&config);
        Self { config, catalog }
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Analyze a bare observation window (no baseline, no drift history).
    pub fn analyze(&self, observations: &[PriceObservation]) -> Analysis {
        self.analyze_window(&AnalysisWindow::new(observations.to_vec()))
    }

    /// Extract features and match every catalog pattern.
    pub fn analyze_window(&self, window: &AnalysisWindow) -> Analysis {
        let features = self.extract(window);
        let matched = self.catalog.matches(&features);

        if let Some(first) = window.observations.first() {
            for m in &matched {
                warn!(
                    asset = %first.asset,
                    pattern = %m.id,
                    severity = %m.severity,
                    confidence = m.confidence,
                    volatility = features.price_volatility,
                    deviation = features.cross_source_deviation,
                    clustering = features.transaction_clustering,
                    "Manipulation pattern matched"
                );
            }
        }

        Analysis { features, matched }
    }

    /// Whether a window on its own looks like a drift window.
    pub fn is_drift_candidate(&self, features: &BehavioralFeatures) -> bool {
        let d = &self.config.drift;
        features.distinct_sources >= 2
            && features.price_volatility < d.max_volatility
            && features.cross_source_deviation > d.min_deviation
    }

    fn extract(&self, window: &AnalysisWindow) -> BehavioralFeatures {
        let obs = &window.observations;
        let distinct_sources = latest_per_source(obs).map(|l| l.len()).unwrap_or(0);

        let mut features = BehavioralFeatures {
            price_volatility: features::price_volatility(obs),
            cross_source_deviation: features::cross_source_deviation(obs),
            temporal_anomaly: features::temporal_anomaly(obs),
            source_count_drop: features::source_count_drop(
                distinct_sources,
                window.baseline_source_count,
            ),
            transaction_clustering: features::transaction_clustering(obs),
            network_congestion: features::network_congestion(obs),
            distinct_sources,
            min_source_confidence: features::min_source_confidence(obs),
            sustained_drift_windows: 0,
        };
        features.sustained_drift_windows = if self.is_drift_candidate(&features) {
            window.prior_drift_windows.saturating_add(1)
        } else {
            0
        };
        features
    }
}

impl Default for ManipulationDetector {
    fn default() -> Self {
        Self::new(PatternConfig::default())
    }
}
