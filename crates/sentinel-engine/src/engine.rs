//! `OracleGuard`: the engine facade.
//!
//! Owns the store, health tracker, detector, scorer, alert emitter and proof
//! generator, and exposes the ingestion, query, proof and alert interfaces.
//! Cloning is cheap; every clone shares the same state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sentinel_core::{
    AssetId, BlockNumber, Confidence, ConsensusMethod, Price, PriceObservation, RejectedReason,
    SourceId,
};
use sentinel_detector::{
    AnalysisWindow, ConsensusCalculator, ConsensusResult, DetectorResult, DriftStreakTracker,
    ManipulationDetector,
};
use sentinel_feed::{FetchError, ObservationStore, SourceHealth, SourceHealthTracker, StoreHandle};
use sentinel_proof::{
    CommitmentProof, PrivateInputs, ProofGenerator, PublicOutputs, PublicSignals, VerificationKey,
};
use sentinel_risk::{AlertEmitter, AlertSink, ChannelAlertSink, RiskAssessment, RiskScorer};
use sentinel_telemetry::Metrics;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

struct Inner {
    config: EngineConfig,
    store: StoreHandle,
    health: Arc<SourceHealthTracker>,
    consensus: ConsensusCalculator,
    detector: ManipulationDetector,
    drift: DriftStreakTracker,
    scorer: RiskScorer,
    emitter: AlertEmitter,
    prover: Arc<ProofGenerator>,
    latest_risk: DashMap<AssetId, RiskAssessment>,
}

#[derive(Clone)]
pub struct OracleGuard {
    inner: Arc<Inner>,
}

impl OracleGuard {
    /// Build the engine, loading the attester key from `config.proof`.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let prover = Arc::new(ProofGenerator::from_config(&config.proof)?);
        Self::with_prover(config, prover)
    }

    /// Build the engine around an existing proof generator.
    pub fn with_prover(config: EngineConfig, prover: Arc<ProofGenerator>) -> EngineResult<Self> {
        config.validate()?;
        let window_ms = i64::try_from(config.engine.window_size_ms).unwrap_or(i64::MAX);
        let inner = Inner {
            store: ObservationStore::new_shared(config.store.clone()),
            health: SourceHealthTracker::new_shared(config.health.clone()),
            consensus: ConsensusCalculator::new(config.consensus.clone()),
            detector: ManipulationDetector::new(config.detector.clone()),
            drift: DriftStreakTracker::new(window_ms),
            scorer: RiskScorer::new(config.risk.clone())?,
            emitter: AlertEmitter::new(),
            prover,
            latest_risk: DashMap::new(),
            config,
        };
        info!(
            attester = %inner.prover.verification_key(),
            window_ms,
            min_sources = inner.config.consensus.min_sources,
            "Oracle guard initialized"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &StoreHandle {
        &self.inner.store
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Validate and record a raw observation.
    ///
    /// # Errors
    ///
    /// `RejectedReason::Malformed` for invalid ids, non-positive prices or
    /// confidences outside [0, 1]; `Stale` / `Replay` from the store.
    pub fn submit_observation(
        &self,
        asset: &str,
        source: &str,
        price: Decimal,
        observed_at: DateTime<Utc>,
        block: Option<BlockNumber>,
        confidence: Decimal,
    ) -> Result<(), RejectedReason> {
        let built = AssetId::new(asset).and_then(|asset| {
            let source = SourceId::new(source)?;
            let confidence = Confidence::new(confidence)?;
            PriceObservation::new(asset, source, Price::new(price), observed_at, block, confidence)
        });
        match built {
            Ok(obs) => self.submit(obs),
            Err(e) => {
                let reason = RejectedReason::from(e);
                warn!(%asset, %source, reason = %reason, "Observation rejected");
                Metrics::observation_rejected(reason.label());
                Err(reason)
            }
        }
    }

    /// Record an already-built observation and update source health.
    pub fn submit(&self, obs: PriceObservation) -> Result<(), RejectedReason> {
        if !obs.price.is_positive() {
            let reason = RejectedReason::Malformed(format!("non-positive price {}", obs.price));
            Metrics::observation_rejected(reason.label());
            return Err(reason);
        }
        let asset = obs.asset.clone();
        let source = obs.source.clone();
        let health_input = obs.clone();
        match self.inner.store.record(obs) {
            Ok(()) => {
                let health = self.inner.health.update(&health_input);
                Metrics::observation_recorded(asset.as_str(), source.as_str());
                record_health_metrics(&health);
                debug!(%asset, %source, price = %health_input.price, "Observation accepted");
                Ok(())
            }
            Err(reason) => {
                warn!(%asset, %source, reason = %reason, "Observation rejected");
                Metrics::observation_rejected(reason.label());
                Err(reason)
            }
        }
    }

    /// Record a failed fetch as a missed update (cancellations are ignored).
    pub fn record_fetch_failure(
        &self,
        asset: &AssetId,
        source: &SourceId,
        err: &FetchError,
        at: DateTime<Utc>,
    ) -> Option<SourceHealth> {
        Metrics::fetch_failure(source.as_str(), err.label());
        if !err.counts_as_miss() {
            return None;
        }
        let health = self.inner.health.record_miss(asset, source, at);
        record_health_metrics(&health);
        Some(health)
    }

    /// Advance health timeouts, prune expired observations and retry alerts
    /// held back by slow subscribers.
    ///
    /// Returns the feeds whose status changed.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<SourceHealth> {
        let changed = self.inner.health.tick(now);
        for health in &changed {
            record_health_metrics(health);
        }
        let pruned = self.inner.store.prune_expired(now);
        if pruned > 0 {
            debug!(pruned, "Expired observations pruned");
        }
        let flushed = self.inner.emitter.flush();
        if flushed > 0 {
            debug!(flushed, "Held-back alerts delivered");
        }
        changed
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Consensus price with the configured default method.
    pub fn get_consensus(&self, asset: &AssetId) -> DetectorResult<ConsensusResult> {
        self.get_consensus_with(asset, self.inner.config.consensus.default_method)
    }

    /// Consensus over the newest price of every non-Offline source in the
    /// current window.
    pub fn get_consensus_with(
        &self,
        asset: &AssetId,
        method: ConsensusMethod,
    ) -> DetectorResult<ConsensusResult> {
        let observations = self.usable_latest(asset, self.inner.config.engine.window());
        let result = self.inner.consensus.compute(&observations, method);
        match &result {
            Ok(consensus) => Metrics::consensus_quality(
                asset.as_str(),
                consensus.consensus_quality.to_f64().unwrap_or(0.0),
            ),
            Err(e) => {
                warn!(%asset, error = %e, "Consensus unavailable");
                Metrics::consensus_failure(asset.as_str(), e.label());
            }
        }
        result
    }

    /// Latest assessment of the current window, evaluating if it is missing
    /// or older than the newest observation.
    pub fn get_risk(&self, asset: &AssetId) -> EngineResult<RiskAssessment> {
        let newest = self
            .inner
            .store
            .newest_at(asset)
            .ok_or_else(|| EngineError::UnknownAsset(asset.clone()))?;
        if let Some(cached) = self.inner.latest_risk.get(asset) {
            if cached.timestamp == newest {
                return Ok(cached.clone());
            }
        }
        self.evaluate(asset)
    }

    pub fn get_source_health(&self, asset: &AssetId) -> Vec<SourceHealth> {
        self.inner.health.snapshot(asset)
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Detect patterns and score the window ending at the newest observation.
    ///
    /// Actionable assessments are pushed to every alert sink. Re-evaluating
    /// the same window yields the same `assessment_id`.
    pub fn evaluate(&self, asset: &AssetId) -> EngineResult<RiskAssessment> {
        let inner = &self.inner;
        let as_of = inner
            .store
            .newest_at(asset)
            .ok_or_else(|| EngineError::UnknownAsset(asset.clone()))?;
        let window_end_ms = as_of.timestamp_millis();

        let observations = inner
            .store
            .recent_as_of(asset, inner.config.engine.window(), as_of);
        let baseline =
            inner
                .store
                .distinct_sources(asset, inner.config.engine.baseline_window(), as_of);
        let prior = inner.drift.prior(asset, window_end_ms);

        let window = AnalysisWindow::new(observations)
            .with_baseline(baseline)
            .with_prior_drift(prior);
        let analysis = inner.detector.analyze_window(&window);
        inner
            .drift
            .record(asset, window_end_ms, analysis.features.sustained_drift_windows);

        let assessment = inner
            .scorer
            .score(asset, &analysis.features, &analysis.matched, as_of);

        Metrics::risk_score(asset.as_str(), assessment.risk_score);
        for m in &analysis.matched {
            Metrics::pattern_matched(asset.as_str(), m.id.as_str());
        }
        if assessment.recommended_action.is_actionable() {
            let delivered = inner.emitter.emit(&assessment);
            Metrics::alert_emitted(assessment.recommended_action.as_str());
            debug!(id = %assessment.assessment_id, delivered, "Alert emitted");
        }

        inner
            .latest_risk
            .insert(asset.clone(), assessment.clone());
        Ok(assessment)
    }

    /// Evaluate every known asset concurrently on the blocking pool.
    pub async fn evaluate_all(&self) -> Vec<(AssetId, EngineResult<RiskAssessment>)> {
        let assets = self.inner.store.assets();
        let tasks = assets.iter().cloned().map(|asset| {
            let guard = self.clone();
            tokio::task::spawn_blocking(move || guard.evaluate(&asset))
        });
        join_all(tasks)
            .await
            .into_iter()
            .zip(assets)
            .map(|(joined, asset)| {
                let result = joined.unwrap_or_else(|e| Err(EngineError::TaskFailed(e.to_string())));
                (asset, result)
            })
            .collect()
    }

    // =========================================================================
    // Proofs
    // =========================================================================

    /// Commit to the consensus over `window` and prove it.
    ///
    /// Generation runs on the blocking pool; a failure here never affects
    /// consensus or risk evaluation.
    pub async fn request_proof(
        &self,
        asset: &AssetId,
        window: Duration,
    ) -> EngineResult<CommitmentProof> {
        let method = self.inner.config.consensus.default_method;
        let observations = self.usable_latest(asset, window);
        let consensus = self.inner.consensus.compute(&observations, method)?;

        let (prices, weights): (Vec<Decimal>, Vec<Decimal>) = observations
            .iter()
            .filter(|o| consensus.contributing_sources.contains(&o.source))
            .map(|o| (o.price.inner(), o.source_confidence.inner()))
            .unzip();
        let inputs = PrivateInputs::with_random_salts(prices, weights);
        let outputs = PublicOutputs {
            asset: asset.clone(),
            aggregated_price: consensus.aggregated_price,
            method,
            trim_fraction: self.inner.config.consensus.trim_fraction,
        };

        let started = Instant::now();
        match self.inner.prover.clone().generate(inputs, outputs).await {
            Ok(proof) => {
                Metrics::proof_generated(started.elapsed().as_secs_f64() * 1_000.0);
                Ok(proof)
            }
            Err(e) => {
                error!(%asset, error = %e, "Proof generation failed");
                Metrics::proof_failed(asset.as_str());
                Err(e.into())
            }
        }
    }

    pub fn verify_proof(&self, proof: &CommitmentProof, public_signals: &PublicSignals) -> bool {
        self.inner.prover.verify(proof, public_signals)
    }

    pub fn verification_key(&self) -> VerificationKey {
        self.inner.prover.verification_key()
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    /// Open a bounded channel receiving every actionable assessment.
    pub fn subscribe_alerts(&self) -> mpsc::Receiver<RiskAssessment> {
        let (sink, rx) = ChannelAlertSink::channel(self.inner.config.engine.alert_channel_capacity);
        self.inner.emitter.register(Arc::new(sink));
        rx
    }

    pub fn register_sink(&self, sink: Arc<dyn AlertSink>) {
        self.inner.emitter.register(sink);
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Newest observation of each usable source in the window ending at the
    /// asset's newest observation.
    fn usable_latest(&self, asset: &AssetId, window: Duration) -> Vec<PriceObservation> {
        let Some(as_of) = self.inner.store.newest_at(asset) else {
            return Vec::new();
        };
        self.inner
            .store
            .latest_per_source(asset, window, as_of)
            .into_iter()
            .filter(|o| self.inner.health.is_usable(asset, &o.source))
            .collect()
    }
}

fn record_health_metrics(health: &SourceHealth) {
    let asset = health.asset.as_str();
    let source = health.source.as_str();
    Metrics::source_status(asset, source, health.status.as_gauge() as f64);
    Metrics::source_reliability(asset, source, health.reliability_score);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use sentinel_detector::DetectorError;
    use sentinel_feed::SourceStatus;
    use sentinel_risk::RecommendedAction;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn guard() -> OracleGuard {
        OracleGuard::new(EngineConfig::default()).unwrap()
    }

    fn cusd() -> AssetId {
        AssetId::new("cUSD").unwrap()
    }

    #[test]
    fn test_submit_rejects_malformed_input() {
        let g = guard();
        let r = g.submit_observation("cUSD", "band", dec!(-1), t(0), None, dec!(1));
        assert!(matches!(r, Err(RejectedReason::Malformed(_))));
        let r = g.submit_observation("", "band", dec!(1), t(0), None, dec!(1));
        assert!(matches!(r, Err(RejectedReason::Malformed(_))));
        let r = g.submit_observation("cUSD", "band", dec!(1), t(0), None, dec!(1.5));
        assert!(matches!(r, Err(RejectedReason::Malformed(_))));
        assert!(g.store().assets().is_empty());
    }

    #[test]
    fn test_submit_rejects_replay() {
        let g = guard();
        g.submit_observation("cUSD", "band", dec!(1), t(0), None, dec!(1))
            .unwrap();
        let r = g.submit_observation("cUSD", "band", dec!(1), t(0), None, dec!(1));
        assert!(matches!(r, Err(RejectedReason::Replay { .. })));
    }

    #[test]
    fn test_consensus_median_and_insufficient_sources() {
        let g = guard();
        g.submit_observation("cUSD", "band", dec!(0.98), t(0), None, dec!(1))
            .unwrap();
        g.submit_observation("cUSD", "chainlink", dec!(1.00), t(10), None, dec!(1))
            .unwrap();
        assert!(matches!(
            g.get_consensus(&cusd()),
            Err(DetectorError::InsufficientSources {
                required: 3,
                found: 2
            })
        ));

        g.submit_observation("cUSD", "tellor", dec!(1.02), t(20), None, dec!(1))
            .unwrap();
        let consensus = g.get_consensus(&cusd()).unwrap();
        assert_eq!(consensus.aggregated_price.inner(), dec!(1.00));
        assert_eq!(consensus.contributing_sources.len(), 3);
        assert_eq!(consensus.computed_at, t(20));

        let again = g.get_consensus(&cusd()).unwrap();
        assert_eq!(consensus, again);

        let mean = g
            .get_consensus_with(&cusd(), ConsensusMethod::WeightedAverage)
            .unwrap();
        assert_eq!(mean.aggregated_price.inner(), dec!(1.00));
    }

    #[test]
    fn test_offline_source_excluded_from_consensus() {
        let g = guard();
        for (i, source) in ["band", "chainlink", "tellor", "redstone"].iter().enumerate() {
            g.submit_observation("cUSD", source, dec!(1.00), t(i as i64), None, dec!(1))
                .unwrap();
        }
        let redstone = SourceId::new("redstone").unwrap();
        for i in 0..3 {
            let err = FetchError::Unavailable("rpc down".to_string());
            g.record_fetch_failure(&cusd(), &redstone, &err, t(100 + i));
        }
        let health = g.get_source_health(&cusd());
        let status = health.iter().find(|h| h.source == redstone).unwrap().status;
        assert_eq!(status, SourceStatus::Offline);

        let consensus = g.get_consensus(&cusd()).unwrap();
        assert_eq!(consensus.contributing_sources.len(), 3);
        assert!(!consensus.contributing_sources.contains(&redstone));
    }

    #[test]
    fn test_cancelled_fetch_is_not_a_miss() {
        let g = guard();
        let band = SourceId::new("band").unwrap();
        assert!(g
            .record_fetch_failure(&cusd(), &band, &FetchError::Cancelled, t(0))
            .is_none());
    }

    #[test]
    fn test_evaluate_quiet_window_and_identity() {
        let g = guard();
        for (i, source) in ["band", "chainlink", "tellor"].iter().enumerate() {
            g.submit_observation("cUSD", source, dec!(1.0001), t(i as i64 * 1_000), None, dec!(1))
                .unwrap();
        }
        let a = g.evaluate(&cusd()).unwrap();
        assert_eq!(a.recommended_action, RecommendedAction::None);
        assert_eq!(a.assessment_id, format!("cUSD:{}", t(2_000).timestamp_millis()));

        let cached = g.get_risk(&cusd()).unwrap();
        assert_eq!(cached, a);
    }

    #[test]
    fn test_unknown_asset() {
        let g = guard();
        assert!(matches!(
            g.evaluate(&cusd()),
            Err(EngineError::UnknownAsset(_))
        ));
        assert!(g.get_source_health(&cusd()).is_empty());
    }
}
