//! Behavioral features over an observation window.
//!
//! Every ratio feature is normalized to [0, 1]. Counts (`distinct_sources`,
//! `sustained_drift_windows`) are carried alongside for pattern rules that
//! need them.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sentinel_core::{median, BlockNumber, PriceObservation};
use serde::{Deserialize, Serialize};

use crate::consensus::latest_per_source;

/// Named feature, used by pattern thresholds and the risk rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PriceVolatility,
    CrossSourceDeviation,
    TemporalAnomaly,
    SourceCountDrop,
    TransactionClustering,
    NetworkCongestion,
    DistinctSources,
    MinSourceConfidence,
    SustainedDriftWindows,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceVolatility => "price_volatility",
            Self::CrossSourceDeviation => "cross_source_deviation",
            Self::TemporalAnomaly => "temporal_anomaly",
            Self::SourceCountDrop => "source_count_drop",
            Self::TransactionClustering => "transaction_clustering",
            Self::NetworkCongestion => "network_congestion",
            Self::DistinctSources => "distinct_sources",
            Self::MinSourceConfidence => "min_source_confidence",
            Self::SustainedDriftWindows => "sustained_drift_windows",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Features extracted from one analysis window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralFeatures {
    /// Sample coefficient of variation of prices.
    pub price_volatility: f64,
    /// Max relative distance of any source's latest price from the cross-source median.
    pub cross_source_deviation: f64,
    /// Coefficient of variation of inter-observation gaps.
    pub temporal_anomaly: f64,
    /// Relative drop in distinct sources versus the trailing baseline.
    pub source_count_drop: f64,
    /// Fraction of observations sharing a `reported_block` with another observation.
    pub transaction_clustering: f64,
    /// Fraction of adjacent block-bearing observations whose block goes backwards.
    pub network_congestion: f64,
    pub distinct_sources: usize,
    /// Lowest source-reported confidence in the window (1.0 when empty).
    pub min_source_confidence: f64,
    /// Consecutive windows, including this one, showing drift.
    pub sustained_drift_windows: u32,
}

impl Default for BehavioralFeatures {
    fn default() -> Self {
        Self {
            price_volatility: 0.0,
            cross_source_deviation: 0.0,
            temporal_anomaly: 0.0,
            source_count_drop: 0.0,
            transaction_clustering: 0.0,
            network_congestion: 0.0,
            distinct_sources: 0,
            min_source_confidence: 1.0,
            sustained_drift_windows: 0,
        }
    }
}

impl BehavioralFeatures {
    /// Value of a named feature as f64.
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::PriceVolatility => self.price_volatility,
            Feature::CrossSourceDeviation => self.cross_source_deviation,
            Feature::TemporalAnomaly => self.temporal_anomaly,
            Feature::SourceCountDrop => self.source_count_drop,
            Feature::TransactionClustering => self.transaction_clustering,
            Feature::NetworkCongestion => self.network_congestion,
            Feature::DistinctSources => self.distinct_sources as f64,
            Feature::MinSourceConfidence => self.min_source_confidence,
            Feature::SustainedDriftWindows => f64::from(self.sustained_drift_windows),
        }
    }
}

fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

fn unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Sample (n-1) coefficient of variation. Zero for fewer than two values or a zero mean.
fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean.abs() < f64::EPSILON {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt() / mean.abs()
}

pub fn price_volatility(observations: &[PriceObservation]) -> f64 {
    let prices: Vec<f64> = observations
        .iter()
        .map(|o| to_f64(o.price.inner()))
        .collect();
    unit(coefficient_of_variation(&prices))
}

/// Uses the newest price of each source, like consensus does.
pub fn cross_source_deviation(observations: &[PriceObservation]) -> f64 {
    let Ok(latest) = latest_per_source(observations) else {
        return 0.0;
    };
    let prices: Vec<Decimal> = latest.values().map(|o| o.price.inner()).collect();
    let Ok(mid) = median(&prices) else {
        return 0.0;
    };
    if mid.is_zero() {
        return 0.0;
    }
    // A ratio past the decimal range is as deviant as it gets.
    let worst = prices
        .iter()
        .map(|p| {
            p.checked_sub(mid)
                .and_then(|d| d.checked_div(mid))
                .map_or(Decimal::MAX, |d| d.abs())
        })
        .max()
        .unwrap_or(Decimal::ZERO);
    unit(to_f64(worst))
}

/// Observations sorted by time, ties broken by source for determinism.
fn time_ordered(observations: &[PriceObservation]) -> Vec<&PriceObservation> {
    let mut ordered: Vec<&PriceObservation> = observations.iter().collect();
    ordered.sort_by(|a, b| {
        a.observed_at
            .cmp(&b.observed_at)
            .then_with(|| a.source.cmp(&b.source))
    });
    ordered
}

pub fn temporal_anomaly(observations: &[PriceObservation]) -> f64 {
    let ordered = time_ordered(observations);
    let gaps: Vec<f64> = ordered
        .windows(2)
        .map(|w| (w[1].observed_at - w[0].observed_at).num_milliseconds() as f64)
        .collect();
    unit(coefficient_of_variation(&gaps))
}

pub fn source_count_drop(current: usize, baseline: Option<usize>) -> f64 {
    match baseline {
        Some(b) if b > current => (b - current) as f64 / b as f64,
        _ => 0.0,
    }
}

pub fn transaction_clustering(observations: &[PriceObservation]) -> f64 {
    if observations.is_empty() {
        return 0.0;
    }
    let mut per_block: HashMap<BlockNumber, usize> = HashMap::new();
    for block in observations.iter().filter_map(|o| o.reported_block) {
        *per_block.entry(block).or_default() += 1;
    }
    let clustered: usize = per_block.values().filter(|c| **c > 1).sum();
    unit(clustered as f64 / observations.len() as f64)
}

pub fn network_congestion(observations: &[PriceObservation]) -> f64 {
    let blocks: Vec<BlockNumber> = time_ordered(observations)
        .into_iter()
        .filter_map(|o| o.reported_block)
        .collect();
    if blocks.len() < 2 {
        return 0.0;
    }
    let inversions = blocks.windows(2).filter(|w| w[1] < w[0]).count();
    unit(inversions as f64 / (blocks.len() - 1) as f64)
}

pub fn min_source_confidence(observations: &[PriceObservation]) -> f64 {
    observations
        .iter()
        .map(|o| to_f64(o.source_confidence.inner()))
        .fold(1.0, f64::min)
}
