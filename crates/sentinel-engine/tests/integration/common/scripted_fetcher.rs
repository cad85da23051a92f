//! Price fetcher that replays a fixed script of responses.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sentinel_core::{AssetId, Confidence, Price, PriceObservation, SourceId};
use sentinel_feed::{BoxFuture, FetchError, PriceFetcher};

#[derive(Debug, Clone)]
pub enum Step {
    Price(Decimal),
    /// Answer for a different asset than the one asked about.
    Misrouted(&'static str, Decimal),
    Fail(FetchError),
    /// Never resolves; the poller's timeout must fire.
    Hang,
}

pub struct ScriptedFetcher {
    source: SourceId,
    base: DateTime<Utc>,
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(source: &str, steps: Vec<Step>) -> Self {
        Self {
            source: SourceId::new(source).unwrap(),
            base: Utc::now(),
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PriceFetcher for ScriptedFetcher {
    fn source(&self) -> &SourceId {
        &self.source
    }

    fn fetch<'a>(
        &'a self,
        asset: &'a AssetId,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<PriceObservation, FetchError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Fail(FetchError::Unavailable("script exhausted".to_string())));
        // One observation per second of script time.
        let observed_at = self.base + ChronoDuration::milliseconds(call as i64 * 1_000);
        Box::pin(async move {
            let observe = |asset: AssetId, price: Decimal| {
                PriceObservation::new(
                    asset,
                    self.source.clone(),
                    Price::new(price),
                    observed_at,
                    None,
                    Confidence::FULL,
                )
                .unwrap()
            };
            match step {
                Step::Price(price) => Ok(observe(asset.clone(), price)),
                Step::Misrouted(other, price) => Ok(observe(AssetId::new(other).unwrap(), price)),
                Step::Fail(e) => Err(e),
                Step::Hang => std::future::pending().await,
            }
        })
    }
}
