//! Append-only, bounded-history observation store.
//!
//! One ring buffer per (asset, source) feed, each behind its own lock, so
//! writers to different feeds never contend on a shared mutex. The outer
//! `DashMap` is only touched to look up (or create) a feed's ring.
//!
//! Protections applied on `record()`:
//! - Replay: a second observation with the same `(source, observed_at)` is rejected
//! - Out-of-order: an observation older than the feed's newest by more than
//!   `skew_tolerance_ms` is rejected as stale
//! - Capacity: the oldest entry is evicted once a ring is full
//! - TTL: entries older than `ttl_ms` behind the feed's newest are dropped

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use sentinel_core::{AssetId, FeedKey, PriceObservation, RejectedReason, SourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{FeedError, FeedResult};

/// Configuration for the observation store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum observations retained per (asset, source).
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// How far behind the feed's newest observation a late arrival may be (ms).
    #[serde(default = "default_skew_tolerance_ms")]
    pub skew_tolerance_ms: i64,

    /// Observations older than this behind the feed's newest are evicted (ms).
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: i64,
}

fn default_capacity() -> usize {
    1_000
}
fn default_skew_tolerance_ms() -> i64 {
    2_000
}
fn default_ttl_ms() -> i64 {
    3_600_000 // 1 hour
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            skew_tolerance_ms: default_skew_tolerance_ms(),
            ttl_ms: default_ttl_ms(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> FeedResult<()> {
        if self.capacity == 0 {
            return Err(FeedError::ConfigError(
                "store.capacity must be at least 1".to_string(),
            ));
        }
        if self.skew_tolerance_ms < 0 {
            return Err(FeedError::ConfigError(format!(
                "store.skew_tolerance_ms ({}) must be non-negative",
                self.skew_tolerance_ms
            )));
        }
        if self.ttl_ms <= self.skew_tolerance_ms {
            return Err(FeedError::ConfigError(format!(
                "store.ttl_ms ({}) must exceed skew_tolerance_ms ({})",
                self.ttl_ms, self.skew_tolerance_ms
            )));
        }
        Ok(())
    }
}

/// Bounded history of one feed, ordered by `observed_at` ascending.
#[derive(Debug, Default)]
struct SourceRing {
    entries: VecDeque<PriceObservation>,
    /// `observed_at` millis currently held, for O(1) replay checks.
    seen: HashSet<i64>,
}

impl SourceRing {
    fn newest_ms(&self) -> Option<i64> {
        self.entries.back().map(PriceObservation::observed_at_ms)
    }

    fn insert(
        &mut self,
        obs: PriceObservation,
        config: &StoreConfig,
    ) -> Result<(), RejectedReason> {
        let ts = obs.observed_at_ms();

        if self.seen.contains(&ts) {
            return Err(RejectedReason::Replay { observed_at_ms: ts });
        }

        match self.newest_ms() {
            Some(newest) if ts < newest => {
                let lag_ms = newest - ts;
                if lag_ms > config.skew_tolerance_ms {
                    return Err(RejectedReason::Stale {
                        lag_ms,
                        tolerance_ms: config.skew_tolerance_ms,
                    });
                }
                // Late but within tolerance: keep the ring sorted.
                let pos = self
                    .entries
                    .partition_point(|e| e.observed_at_ms() <= ts);
                self.entries.insert(pos, obs);
            }
            _ => self.entries.push_back(obs),
        }
        self.seen.insert(ts);

        while self.entries.len() > config.capacity {
            self.pop_oldest();
        }
        if let Some(newest) = self.newest_ms() {
            self.evict_older_than(newest.saturating_sub(config.ttl_ms));
        }
        Ok(())
    }

    fn pop_oldest(&mut self) -> Option<PriceObservation> {
        let evicted = self.entries.pop_front()?;
        self.seen.remove(&evicted.observed_at_ms());
        Some(evicted)
    }

    fn evict_older_than(&mut self, cutoff_ms: i64) -> usize {
        let mut removed = 0;
        while self
            .entries
            .front()
            .is_some_and(|e| e.observed_at_ms() < cutoff_ms)
        {
            self.pop_oldest();
            removed += 1;
        }
        removed
    }
}

/// Concurrent observation store.
///
/// Owns the lifetime of every `PriceObservation`; readers get cloned snapshots.
pub struct ObservationStore {
    config: StoreConfig,
    rings: DashMap<FeedKey, Arc<Mutex<SourceRing>>>,
    /// Sources seen per asset, in first-seen order.
    sources: DashMap<AssetId, Vec<SourceId>>,
}

impl ObservationStore {
    /// Create a new store with the given configuration.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            rings: DashMap::new(),
            sources: DashMap::new(),
        }
    }

    /// Create a new store wrapped in Arc for sharing.
    #[must_use]
    pub fn new_shared(config: StoreConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Get (or create) the ring for a feed, releasing the map guard before returning.
    fn ring(&self, key: &FeedKey) -> Arc<Mutex<SourceRing>> {
        if let Some(ring) = self.rings.get(key) {
            return Arc::clone(ring.value());
        }
        let ring = self
            .rings
            .entry(key.clone())
            .or_insert_with(|| {
                self.sources
                    .entry(key.asset.clone())
                    .or_default()
                    .push(key.source.clone());
                debug!(feed = %key, "New feed registered");
                Arc::new(Mutex::new(SourceRing::default()))
            });
        Arc::clone(ring.value())
    }

    /// Rings currently held for an asset.
    fn asset_rings(&self, asset: &AssetId) -> Vec<(SourceId, Arc<Mutex<SourceRing>>)> {
        let sources = match self.sources.get(asset) {
            Some(s) => s.value().clone(),
            None => return Vec::new(),
        };
        sources
            .into_iter()
            .filter_map(|source| {
                let key = FeedKey::new(asset.clone(), source.clone());
                self.rings
                    .get(&key)
                    .map(|r| (source, Arc::clone(r.value())))
            })
            .collect()
    }

    /// Record an observation.
    ///
    /// Never blocks on other feeds; amortized O(1) for in-order arrivals.
    pub fn record(&self, obs: PriceObservation) -> Result<(), RejectedReason> {
        let key = obs.feed_key();
        let ring = self.ring(&key);
        let mut ring = ring.lock();
        ring.insert(obs, &self.config)?;
        trace!(feed = %key, len = ring.entries.len(), "Observation recorded");
        Ok(())
    }

    /// All observations for `asset` within `window` of `as_of`, newest first.
    ///
    /// Ties on `observed_at` are ordered by source id for determinism.
    pub fn recent_as_of(
        &self,
        asset: &AssetId,
        window: Duration,
        as_of: DateTime<Utc>,
    ) -> Vec<PriceObservation> {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let upper = as_of.timestamp_millis();
        let lower = upper.saturating_sub(window_ms);

        let mut out: Vec<PriceObservation> = Vec::new();
        for (_, ring) in self.asset_rings(asset) {
            let ring = ring.lock();
            out.extend(
                ring.entries
                    .iter()
                    .rev()
                    .take_while(|e| e.observed_at_ms() >= lower)
                    .filter(|e| e.observed_at_ms() <= upper)
                    .cloned(),
            );
        }
        out.sort_by(|a, b| {
            b.observed_at
                .cmp(&a.observed_at)
                .then_with(|| a.source.cmp(&b.source))
        });
        out
    }

    /// All observations for `asset` within `window` of now, newest first.
    pub fn recent(&self, asset: &AssetId, window: Duration) -> Vec<PriceObservation> {
        self.recent_as_of(asset, window, Utc::now())
    }

    /// Newest observation of each source within the window, ordered by source id.
    pub fn latest_per_source(
        &self,
        asset: &AssetId,
        window: Duration,
        as_of: DateTime<Utc>,
    ) -> Vec<PriceObservation> {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let upper = as_of.timestamp_millis();
        let lower = upper.saturating_sub(window_ms);

        let mut out: Vec<PriceObservation> = self
            .asset_rings(asset)
            .into_iter()
            .filter_map(|(_, ring)| {
                let ring = ring.lock();
                ring.entries
                    .iter()
                    .rev()
                    .find(|e| e.observed_at_ms() <= upper)
                    .filter(|e| e.observed_at_ms() >= lower)
                    .cloned()
            })
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }

    /// Number of distinct sources with at least one observation in the window.
    pub fn distinct_sources(&self, asset: &AssetId, window: Duration, as_of: DateTime<Utc>) -> usize {
        self.latest_per_source(asset, window, as_of).len()
    }

    /// Newest `observed_at` across all sources of an asset.
    pub fn newest_at(&self, asset: &AssetId) -> Option<DateTime<Utc>> {
        self.asset_rings(asset)
            .into_iter()
            .filter_map(|(_, ring)| ring.lock().entries.back().map(|e| e.observed_at))
            .max()
    }

    /// Assets with at least one registered feed, sorted.
    pub fn assets(&self) -> Vec<AssetId> {
        let mut assets: Vec<AssetId> = self.sources.iter().map(|e| e.key().clone()).collect();
        assets.sort();
        assets
    }

    /// Number of observations held for a feed.
    pub fn len(&self, key: &FeedKey) -> usize {
        self.rings
            .get(key)
            .map(|r| r.value().lock().entries.len())
            .unwrap_or(0)
    }

    /// Number of registered feeds.
    pub fn feed_count(&self) -> usize {
        self.rings.len()
    }

    /// Drop observations older than `ttl_ms` before `as_of` across all feeds.
    ///
    /// Returns the number of observations removed.
    pub fn prune_expired(&self, as_of: DateTime<Utc>) -> usize {
        let cutoff = as_of.timestamp_millis().saturating_sub(self.config.ttl_ms);
        let rings: Vec<Arc<Mutex<SourceRing>>> =
            self.rings.iter().map(|r| Arc::clone(r.value())).collect();
        let removed: usize = rings
            .iter()
            .map(|ring| ring.lock().evict_older_than(cutoff))
            .sum();
        if removed > 0 {
            debug!(removed, "Pruned expired observations");
        }
        removed
    }
}

/// Thread-safe handle to ObservationStore.
pub type StoreHandle = Arc<ObservationStore>;
