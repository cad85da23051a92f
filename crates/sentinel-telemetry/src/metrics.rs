//! Prometheus metrics for the oracle sentinel.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a startup bug that should crash immediately.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram, CounterVec, GaugeVec,
    Histogram, TextEncoder,
};

use crate::error::TelemetryResult;

/// Accepted observations.
pub static OBSERVATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_observations_total",
        "Price observations accepted into the store",
        &["asset", "source"]
    )
    .unwrap()
});

/// Rejected observations.
/// Labels: reason (stale/replay/malformed)
pub static OBSERVATIONS_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_observations_rejected_total",
        "Price observations rejected at ingestion",
        &["reason"]
    )
    .unwrap()
});

pub static CONSENSUS_QUALITY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sentinel_consensus_quality",
        "Quality of the latest consensus price (1 = perfect agreement)",
        &["asset"]
    )
    .unwrap()
});

pub static CONSENSUS_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_consensus_failures_total",
        "Consensus computations that failed",
        &["asset", "reason"]
    )
    .unwrap()
});

pub static RISK_SCORE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sentinel_risk_score",
        "Latest risk score per asset in [0, 1]",
        &["asset"]
    )
    .unwrap()
});

pub static PATTERN_MATCHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_pattern_matches_total",
        "Manipulation pattern matches",
        &["asset", "pattern"]
    )
    .unwrap()
});

/// Source status (0 = healthy, 1 = degraded, 2 = offline).
pub static SOURCE_STATUS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sentinel_source_status",
        "Source health status (0=healthy, 1=degraded, 2=offline)",
        &["asset", "source"]
    )
    .unwrap()
});

pub static SOURCE_RELIABILITY: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "sentinel_source_reliability",
        "Source reliability score in [0, 1]",
        &["asset", "source"]
    )
    .unwrap()
});

/// Fetch failures at the collaborator boundary.
/// Labels: reason (timeout/unavailable/invalid_response/cancelled)
pub static FETCH_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_fetch_failures_total",
        "Oracle fetch failures",
        &["source", "reason"]
    )
    .unwrap()
});

pub static ALERTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_alerts_total",
        "Actionable risk assessments emitted",
        &["action"]
    )
    .unwrap()
});

pub static PROOF_GENERATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "sentinel_proof_generation_ms",
        "Proof generation time in milliseconds",
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0]
    )
    .unwrap()
});

pub static PROOF_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentinel_proof_failures_total",
        "Proof generation failures",
        &["asset"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn observation_recorded(asset: &str, source: &str) {
        OBSERVATIONS_TOTAL.with_label_values(&[asset, source]).inc();
    }

    pub fn observation_rejected(reason: &str) {
        OBSERVATIONS_REJECTED_TOTAL
            .with_label_values(&[reason])
            .inc();
    }

    pub fn consensus_quality(asset: &str, quality: f64) {
        CONSENSUS_QUALITY.with_label_values(&[asset]).set(quality);
    }

    pub fn consensus_failure(asset: &str, reason: &str) {
        CONSENSUS_FAILURES_TOTAL
            .with_label_values(&[asset, reason])
            .inc();
    }

    pub fn risk_score(asset: &str, score: f64) {
        RISK_SCORE.with_label_values(&[asset]).set(score);
    }

    pub fn pattern_matched(asset: &str, pattern: &str) {
        PATTERN_MATCHES_TOTAL
            .with_label_values(&[asset, pattern])
            .inc();
    }

    /// Record source status as its gauge value.
    pub fn source_status(asset: &str, source: &str, status: f64) {
        SOURCE_STATUS.with_label_values(&[asset, source]).set(status);
    }

    pub fn source_reliability(asset: &str, source: &str, reliability: f64) {
        SOURCE_RELIABILITY
            .with_label_values(&[asset, source])
            .set(reliability);
    }

    pub fn fetch_failure(source: &str, reason: &str) {
        FETCH_FAILURES_TOTAL
            .with_label_values(&[source, reason])
            .inc();
    }

    pub fn alert_emitted(action: &str) {
        ALERTS_TOTAL.with_label_values(&[action]).inc();
    }

    pub fn proof_generated(elapsed_ms: f64) {
        PROOF_GENERATION_MS.observe(elapsed_ms);
    }

    pub fn proof_failed(asset: &str) {
        PROOF_FAILURES_TOTAL.with_label_values(&[asset]).inc();
    }

    /// Render every registered metric in the text exposition format.
    pub fn gather_text() -> TelemetryResult<String> {
        Ok(TextEncoder::new().encode_to_string(&prometheus::gather())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_text_contains_recorded_metrics() {
        Metrics::observation_recorded("TEST_GATHER", "chainlink");
        Metrics::risk_score("TEST_GATHER", 0.42);
        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("sentinel_observations_total"));
        assert!(text.contains("asset=\"TEST_GATHER\""));
        assert!(text.contains("sentinel_risk_score"));
    }

    #[test]
    fn test_counters_accumulate() {
        let before = OBSERVATIONS_REJECTED_TOTAL
            .with_label_values(&["test_reason"])
            .get();
        Metrics::observation_rejected("test_reason");
        Metrics::observation_rejected("test_reason");
        let after = OBSERVATIONS_REJECTED_TOTAL
            .with_label_values(&["test_reason"])
            .get();
        assert_eq!(after - before, 2.0);
    }
}
