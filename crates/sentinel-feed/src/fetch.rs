//! Fetch interface to oracle sources.
//!
//! The sentinel does not speak any chain protocol itself. Each oracle
//! source is reached through a `PriceFetcher` supplied by the embedding
//! application; the poller drives them on an interval and feeds the
//! results into the store.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use sentinel_core::{AssetId, PriceObservation, SourceId};
use thiserror::Error;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Why a fetch produced no observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Short label for metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Unavailable(_) => "unavailable",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the failure should count as a missed heartbeat for the source.
    #[must_use]
    pub fn counts_as_miss(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// A single oracle source able to report prices for assets.
///
/// Implementations must honor `timeout` themselves or return promptly;
/// the poller additionally wraps every call in `tokio::time::timeout`.
pub trait PriceFetcher: Send + Sync {
    /// Source this fetcher reports for.
    fn source(&self) -> &SourceId;

    /// Fetch the current price of `asset`.
    fn fetch<'a>(
        &'a self,
        asset: &'a AssetId,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<PriceObservation, FetchError>>;
}

/// Shared, type-erased fetcher.
pub type DynPriceFetcher = Arc<dyn PriceFetcher>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use sentinel_core::{Confidence, Price};

    struct FixedFetcher {
        source: SourceId,
        price: Price,
    }

    impl PriceFetcher for FixedFetcher {
        fn source(&self) -> &SourceId {
            &self.source
        }

        fn fetch<'a>(
            &'a self,
            asset: &'a AssetId,
            _timeout: Duration,
        ) -> BoxFuture<'a, Result<PriceObservation, FetchError>> {
            Box::pin(async move {
                PriceObservation::new(
                    asset.clone(),
                    self.source.clone(),
                    self.price,
                    Utc::now(),
                    None,
                    Confidence::FULL,
                )
                .map_err(|e| FetchError::InvalidResponse(e.to_string()))
            })
        }
    }

    #[tokio::test]
    async fn test_dyn_fetcher_returns_observation() {
        let fetcher: DynPriceFetcher = Arc::new(FixedFetcher {
            source: SourceId::new("band").unwrap(),
            price: Price::new(dec!(1.0001)),
        });
        let asset = AssetId::new("cUSD").unwrap();

        let obs = fetcher
            .fetch(&asset, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(obs.source.as_str(), "band");
        assert_eq!(obs.price.inner(), dec!(1.0001));
    }

    #[tokio::test]
    async fn test_invalid_price_surfaces_as_invalid_response() {
        let fetcher = FixedFetcher {
            source: SourceId::new("band").unwrap(),
            price: Price::ZERO,
        };
        let asset = AssetId::new("cUSD").unwrap();
        let err = fetcher
            .fetch(&asset, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.label(), "invalid_response");
        assert!(err.counts_as_miss());
        assert!(!FetchError::Cancelled.counts_as_miss());
    }
}
