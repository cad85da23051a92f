//! Price observations reported by oracle sources.

use crate::decimal::{Confidence, Price};
use crate::error::Result;
use crate::ids::{AssetId, FeedKey, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chain block height a source attached to its report.
pub type BlockNumber = u64;

/// A single price report from one oracle source.
///
/// Immutable once recorded. Created by ingestion, evicted by the store's
/// ring capacity or TTL, never mutated in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub asset: AssetId,
    pub source: SourceId,
    pub price: Price,
    pub observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported_block: Option<BlockNumber>,
    #[serde(default)]
    pub source_confidence: Confidence,
}

impl PriceObservation {
    /// Create an observation, validating that the price is strictly positive.
    pub fn new(
        asset: AssetId,
        source: SourceId,
        price: Price,
        observed_at: DateTime<Utc>,
        reported_block: Option<BlockNumber>,
        source_confidence: Confidence,
    ) -> Result<Self> {
        let price = Price::positive(price.inner())?;
        Ok(Self {
            asset,
            source,
            price,
            observed_at,
            reported_block,
            source_confidence,
        })
    }

    /// Feed this observation belongs to.
    pub fn feed_key(&self) -> FeedKey {
        FeedKey::new(self.asset.clone(), self.source.clone())
    }

    /// Observation time in Unix milliseconds.
    #[inline]
    pub fn observed_at_ms(&self) -> i64 {
        self.observed_at.timestamp_millis()
    }
}
