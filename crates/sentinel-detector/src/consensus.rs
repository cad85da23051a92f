//! Consensus price calculation.
//!
//! Only the newest observation of each source in the window contributes, so
//! a chatty source cannot outvote quiet ones. Everything is a pure function
//! of the input slice: repeated calls return identical results.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentinel_core::{
    aggregate, max_relative_spread, AssetId, ConsensusMethod, Price, PriceObservation, SourceId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConsensusConfig;
use crate::error::{DetectorError, DetectorResult};

/// Aggregated price for one asset over one evaluation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub asset: AssetId,
    pub aggregated_price: Price,
    pub method: ConsensusMethod,
    pub contributing_sources: BTreeSet<SourceId>,
    /// `1 - max pairwise relative deviation`, clamped to [0, 1].
    pub consensus_quality: Decimal,
    /// Newest `observed_at` among contributing observations.
    pub computed_at: DateTime<Utc>,
}

pub struct ConsensusCalculator {
    config: ConsensusConfig,
}

impl ConsensusCalculator {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Compute the consensus price of `observations` with `method`.
    ///
    /// # Errors
    ///
    /// - `InsufficientSources` when fewer than `min_sources` distinct sources are present
    /// - `InvalidInput` when observations span more than one asset
    /// - `Core` when the method is undefined for the inputs (e.g. zero total weight)
    pub fn compute(
        &self,
        observations: &[PriceObservation],
        method: ConsensusMethod,
    ) -> DetectorResult<ConsensusResult> {
        let latest = latest_per_source(observations)?;
        if latest.len() < self.config.min_sources || latest.is_empty() {
            return Err(DetectorError::InsufficientSources {
                required: self.config.min_sources,
                found: latest.len(),
            });
        }

        let prices: Vec<Decimal> = latest.values().map(|o| o.price.inner()).collect();
        let weights: Vec<Decimal> = latest
            .values()
            .map(|o| o.source_confidence.inner())
            .collect();
        let aggregated = aggregate(method, &prices, &weights, self.config.trim_fraction)?;

        let quality = Decimal::ONE
            .saturating_sub(max_relative_spread(&prices))
            .clamp(Decimal::ZERO, Decimal::ONE);
        let computed_at = latest
            .values()
            .map(|o| o.observed_at)
            .max()
            .ok_or_else(|| DetectorError::InvalidInput("empty window".to_string()))?;
        let asset = latest
            .values()
            .next()
            .map(|o| o.asset.clone())
            .ok_or_else(|| DetectorError::InvalidInput("empty window".to_string()))?;

        debug!(
            %asset,
            %method,
            price = %aggregated,
            quality = %quality,
            sources = latest.len(),
            "Consensus computed"
        );

        Ok(ConsensusResult {
            asset,
            aggregated_price: Price::new(aggregated),
            method,
            contributing_sources: latest.keys().cloned().collect(),
            consensus_quality: quality,
            computed_at,
        })
    }
}

/// Newest observation per source, keyed (and thus ordered) by source id.
///
/// Ties on `observed_at` keep the higher price so the result does not depend
/// on input order.
pub(crate) fn latest_per_source(
    observations: &[PriceObservation],
) -> DetectorResult<BTreeMap<SourceId, &PriceObservation>> {
    let mut latest: BTreeMap<SourceId, &PriceObservation> = BTreeMap::new();
    let mut asset: Option<&AssetId> = None;
    for obs in observations {
        match asset {
            None => asset = Some(&obs.asset),
            Some(a) if a != &obs.asset => {
                return Err(DetectorError::InvalidInput(format!(
                    "observations span multiple assets: {a} and {}",
                    obs.asset
                )));
            }
            Some(_) => {}
        }
        latest
            .entry(obs.source.clone())
            .and_modify(|cur| {
                if (obs.observed_at, obs.price) > (cur.observed_at, cur.price) {
                    *cur = obs;
                }
            })
            .or_insert(obs);
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use sentinel_core::Confidence;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn obs(source: &str, price: Decimal, secs: i64, confidence: Decimal) -> PriceObservation {
        PriceObservation::new(
            AssetId::new("cUSD").unwrap(),
            SourceId::new(source).unwrap(),
            Price::new(price),
            t0() + Duration::seconds(secs),
            None,
            Confidence::new(confidence).unwrap(),
        )
        .unwrap()
    }

    fn calculator() -> ConsensusCalculator {
        ConsensusCalculator::new(ConsensusConfig::default())
    }

    #[test]
    fn test_median_of_three() {
        let window = vec![
            obs("band", dec!(0.98), 0, dec!(1)),
            obs("chainlink", dec!(1.00), 1, dec!(1)),
            obs("tellor", dec!(1.02), 2, dec!(1)),
        ];
        let result = calculator()
            .compute(&window, ConsensusMethod::Median)
            .unwrap();
        assert_eq!(result.aggregated_price.inner(), dec!(1.00));
        assert_eq!(result.contributing_sources.len(), 3);
        assert_eq!(result.computed_at, t0() + Duration::seconds(2));
    }

    #[test]
    fn test_median_of_four_averages_central_pair() {
        let window = vec![
            obs("band", dec!(0.98), 0, dec!(1)),
            obs("chainlink", dec!(1.00), 0, dec!(1)),
            obs("tellor", dec!(1.02), 0, dec!(1)),
            obs("mento", dec!(1.10), 0, dec!(1)),
        ];
        let result = calculator()
            .compute(&window, ConsensusMethod::Median)
            .unwrap();
        assert_eq!(result.aggregated_price.inner(), dec!(1.01));
    }

    #[test]
    fn test_insufficient_sources() {
        let window = vec![
            obs("band", dec!(1.00), 0, dec!(1)),
            obs("chainlink", dec!(1.00), 0, dec!(1)),
            obs("chainlink", dec!(1.01), 5, dec!(1)),
        ];
        let err = calculator()
            .compute(&window, ConsensusMethod::Median)
            .unwrap_err();
        assert!(matches!(
            err,
            DetectorError::InsufficientSources {
                required: 3,
                found: 2
            }
        ));

        let err = calculator().compute(&[], ConsensusMethod::Median).unwrap_err();
        assert!(matches!(err, DetectorError::InsufficientSources { found: 0, .. }));
    }

    #[test]
    fn test_newest_observation_per_source_wins() {
        let window = vec![
            obs("band", dec!(5.00), 0, dec!(1)),
            obs("band", dec!(1.00), 10, dec!(1)),
            obs("chainlink", dec!(1.00), 3, dec!(1)),
            obs("tellor", dec!(1.00), 4, dec!(1)),
        ];
        let result = calculator()
            .compute(&window, ConsensusMethod::Median)
            .unwrap();
        assert_eq!(result.aggregated_price.inner(), dec!(1.00));
        assert_eq!(result.consensus_quality, Decimal::ONE);
    }

    #[test]
    fn test_weighted_average_uses_confidence() {
        let window = vec![
            obs("band", dec!(1.00), 0, dec!(0.5)),
            obs("chainlink", dec!(2.00), 0, dec!(0.25)),
            obs("tellor", dec!(2.00), 0, dec!(0.25)),
        ];
        let result = calculator()
            .compute(&window, ConsensusMethod::WeightedAverage)
            .unwrap();
        assert_eq!(result.aggregated_price.inner(), dec!(1.5));
    }

    #[test]
    fn test_weighted_average_zero_weights_fails() {
        let window = vec![
            obs("band", dec!(1.00), 0, dec!(0)),
            obs("chainlink", dec!(2.00), 0, dec!(0)),
            obs("tellor", dec!(2.00), 0, dec!(0)),
        ];
        let err = calculator()
            .compute(&window, ConsensusMethod::WeightedAverage)
            .unwrap_err();
        assert!(matches!(err, DetectorError::Core(_)));
    }

    #[test]
    fn test_quality_reflects_spread() {
        let window = vec![
            obs("band", dec!(1.00), 0, dec!(1)),
            obs("chainlink", dec!(1.05), 0, dec!(1)),
            obs("tellor", dec!(1.02), 0, dec!(1)),
        ];
        let result = calculator()
            .compute(&window, ConsensusMethod::TrimmedMean)
            .unwrap();
        assert_eq!(result.consensus_quality, dec!(0.95));
    }

    #[test]
    fn test_deterministic_regardless_of_input_order() {
        let mut window = vec![
            obs("band", dec!(0.99), 0, dec!(0.9)),
            obs("chainlink", dec!(1.00), 1, dec!(0.8)),
            obs("tellor", dec!(1.03), 2, dec!(0.7)),
            obs("band", dec!(1.01), 0, dec!(0.9)),
        ];
        let calc = calculator();
        let first = calc
            .compute(&window, ConsensusMethod::WeightedAverage)
            .unwrap();
        window.reverse();
        let second = calc
            .compute(&window, ConsensusMethod::WeightedAverage)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mixed_assets_rejected() {
        let mut other = obs("tellor", dec!(1.00), 0, dec!(1));
        other.asset = AssetId::new("cEUR").unwrap();
        let window = vec![
            obs("band", dec!(1.00), 0, dec!(1)),
            obs("chainlink", dec!(1.00), 0, dec!(1)),
            other,
        ];
        let err = calculator()
            .compute(&window, ConsensusMethod::Median)
            .unwrap_err();
        assert!(matches!(err, DetectorError::InvalidInput(_)));
    }
}
