//! Feed poller against scripted fetchers.

mod integration;

use std::sync::Arc;
use std::time::Duration;

use integration::common::scripted_fetcher::{ScriptedFetcher, Step};
use integration::common::{asset, guard};
use rust_decimal_macros::dec;
use sentinel_core::SourceId;
use sentinel_engine::{FeedPoller, OracleGuard, PollSummary};
use sentinel_feed::{DynPriceFetcher, FetchError, SourceStatus};
use tokio_util::sync::CancellationToken;

fn poller(
    g: &OracleGuard,
    fetchers: Vec<DynPriceFetcher>,
    assets: &[&str],
) -> FeedPoller {
    FeedPoller::new(
        g.clone(),
        fetchers,
        assets.iter().map(|a| asset(a)).collect(),
        Duration::from_secs(5),
        Duration::from_secs(2),
    )
}

#[tokio::test(start_paused = true)]
async fn test_successful_fetches_are_ingested() {
    let g = guard();
    let fetchers: Vec<DynPriceFetcher> = ["band", "chainlink", "tellor"]
        .iter()
        .map(|s| Arc::new(ScriptedFetcher::new(s, vec![Step::Price(dec!(1.00))])) as DynPriceFetcher)
        .collect();

    let summary = poller(&g, fetchers, &["cUSD"]).poll_once().await;
    assert_eq!(
        summary,
        PollSummary {
            accepted: 3,
            rejected: 0,
            failed: 0,
        }
    );
    let consensus = g.get_consensus(&asset("cUSD")).unwrap();
    assert_eq!(consensus.aggregated_price.inner(), dec!(1.00));
}

#[tokio::test(start_paused = true)]
async fn test_hung_fetch_times_out_as_miss() {
    let g = guard();
    let hung = Arc::new(ScriptedFetcher::new(
        "band",
        vec![Step::Price(dec!(1.00)), Step::Hang],
    ));
    let p = poller(&g, vec![hung.clone() as DynPriceFetcher], &["cUSD"]);

    assert_eq!(p.poll_once().await.accepted, 1);
    let summary = p.poll_once().await;
    assert_eq!(summary.failed, 1);
    assert_eq!(hung.calls(), 2);

    let band = SourceId::new("band").unwrap();
    let health = g.get_source_health(&asset("cUSD"));
    let band_health = health.iter().find(|h| h.source == band).unwrap();
    assert_eq!(band_health.status, SourceStatus::Degraded);
    assert_eq!(band_health.consecutive_misses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failures_and_cancellations() {
    let g = guard();
    let flaky: DynPriceFetcher = Arc::new(ScriptedFetcher::new(
        "band",
        vec![
            Step::Price(dec!(1.00)),
            Step::Fail(FetchError::Unavailable("rpc down".to_string())),
            Step::Fail(FetchError::Cancelled),
        ],
    ));
    let p = poller(&g, vec![flaky], &["cUSD"]);

    p.poll_once().await;
    assert_eq!(p.poll_once().await.failed, 1);
    assert_eq!(p.poll_once().await.failed, 1);

    // The cancellation is counted as a failure but not as a miss.
    let health = g.get_source_health(&asset("cUSD"));
    assert_eq!(health[0].consecutive_misses, 1);
}

#[tokio::test(start_paused = true)]
async fn test_response_for_wrong_asset_is_rejected() {
    let g = guard();
    let fetcher: DynPriceFetcher = Arc::new(ScriptedFetcher::new(
        "band",
        vec![Step::Misrouted("cEUR", dec!(1.08))],
    ));
    let p = poller(&g, vec![fetcher], &["cUSD"]);

    let summary = p.poll_once().await;
    assert_eq!(summary.failed, 1);
    assert!(g.store().assets().is_empty());

    // Counted against the feed that was asked.
    let health = g.get_source_health(&asset("cUSD"));
    assert_eq!(health[0].status, SourceStatus::Degraded);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_cancel() {
    let g = guard();
    let fetcher = Arc::new(ScriptedFetcher::new(
        "band",
        (0..10).map(|_| Step::Price(dec!(1.00))).collect(),
    ));
    let p = poller(&g, vec![fetcher.clone() as DynPriceFetcher], &["cUSD"]);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(p.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(12_500)).await;
    cancel.cancel();
    handle.await.unwrap();

    // Rounds at 0s, 5s and 10s.
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(g.store().assets().len(), 1);
}
