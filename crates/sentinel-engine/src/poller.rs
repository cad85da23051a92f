//! Feed poller.
//!
//! Drives every configured `PriceFetcher` on an interval. Each fetch is
//! bounded by `tokio::time::timeout`; successes go through the normal
//! ingestion path, failures are recorded as missed updates.

use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use sentinel_core::{AssetId, PriceObservation};
use sentinel_feed::{DynPriceFetcher, FetchError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::OracleGuard;
use crate::error::EngineResult;

/// Outcome counts of one polling round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
}

enum FetchOutcome {
    Accepted,
    Rejected,
    Failed,
}

pub struct FeedPoller {
    guard: OracleGuard,
    fetchers: Vec<DynPriceFetcher>,
    assets: Vec<AssetId>,
    interval: Duration,
    fetch_timeout: Duration,
}

impl FeedPoller {
    pub fn new(
        guard: OracleGuard,
        fetchers: Vec<DynPriceFetcher>,
        assets: Vec<AssetId>,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            guard,
            fetchers,
            assets,
            interval,
            fetch_timeout,
        }
    }

    /// Poller using the engine's `[poller]` configuration.
    pub fn from_config(guard: OracleGuard, fetchers: Vec<DynPriceFetcher>) -> EngineResult<Self> {
        let poller = guard.config().poller.clone();
        let assets = poller.asset_ids()?;
        Ok(Self::new(
            guard,
            fetchers,
            assets,
            poller.interval(),
            poller.fetch_timeout(),
        ))
    }

    /// Fetch every (source, asset) pair once, concurrently.
    pub async fn poll_once(&self) -> PollSummary {
        let fetches = self
            .fetchers
            .iter()
            .flat_map(|f| self.assets.iter().map(move |a| (f, a)))
            .map(|(fetcher, asset)| self.fetch_one(fetcher, asset));

        let mut summary = PollSummary::default();
        for outcome in join_all(fetches).await {
            match outcome {
                FetchOutcome::Accepted => summary.accepted += 1,
                FetchOutcome::Rejected => summary.rejected += 1,
                FetchOutcome::Failed => summary.failed += 1,
            }
        }
        debug!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            failed = summary.failed,
            "Poll round complete"
        );
        summary
    }

    async fn fetch_one(&self, fetcher: &DynPriceFetcher, asset: &AssetId) -> FetchOutcome {
        let source = fetcher.source();
        let timeout_ms = u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX);
        let result = match tokio::time::timeout(
            self.fetch_timeout,
            fetcher.fetch(asset, self.fetch_timeout),
        )
        .await
        {
            Ok(result) => result.and_then(|obs| check_response(obs, asset, fetcher)),
            Err(_) => Err(FetchError::Timeout { ms: timeout_ms }),
        };

        match result {
            Ok(obs) => match self.guard.submit(obs) {
                Ok(()) => FetchOutcome::Accepted,
                Err(_) => FetchOutcome::Rejected,
            },
            Err(e) => {
                warn!(%asset, %source, error = %e, "Fetch failed");
                self.guard.record_fetch_failure(asset, source, &e, Utc::now());
                FetchOutcome::Failed
            }
        }
    }

    /// Poll until `cancel` fires, ticking source health after every round.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            fetchers = self.fetchers.len(),
            assets = self.assets.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Feed poller started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                    self.guard.tick(Utc::now());
                }
            }
        }
        info!("Feed poller stopped");
    }
}

/// A fetcher must answer for the asset it was asked about, as itself.
fn check_response(
    obs: PriceObservation,
    asset: &AssetId,
    fetcher: &DynPriceFetcher,
) -> Result<PriceObservation, FetchError> {
    if &obs.asset != asset || &obs.source != fetcher.source() {
        return Err(FetchError::InvalidResponse(format!(
            "asked {}/{}, got {}/{}",
            asset,
            fetcher.source(),
            obs.asset,
            obs.source
        )));
    }
    Ok(obs)
}
