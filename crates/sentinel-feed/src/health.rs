//! Per-source heartbeat and reliability tracking.
//!
//! The tracker is the only owner of `SourceHealth` state. Each (asset, source)
//! feed has its own entry in a `DashMap`, so updates to different feeds never
//! contend on a global lock. Callers get cloned snapshots.
//!
//! # State machine
//!
//! ```text
//! Healthy --(misses >= degraded_threshold)--> Degraded
//! Degraded --(misses >= offline_threshold)--> Offline
//! Degraded/Offline --(on-time observation)--> Healthy (misses = 0)
//! ```
//!
//! Misses come from three places: a late observation (gap > `timeout_ms`),
//! `record_miss` (a failed fetch) and `tick` (time passing with no arrivals).
//! Misses already attributed by `tick`/`record_miss` are not counted again
//! when the late observation finally arrives.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sentinel_core::{AssetId, FeedKey, PriceObservation, SourceId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FeedError, FeedResult};

/// Reliability ceiling for any feed that has ever missed an update.
const RECOVERED_RELIABILITY_CAP: f64 = 0.9999;

/// Health status of one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Healthy,
    Degraded,
    Offline,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }

    /// Gauge encoding: 0 healthy, 1 degraded, 2 offline.
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Offline => 2,
        }
    }
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of one feed's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: SourceId,
    pub asset: AssetId,
    pub status: SourceStatus,
    pub last_update: DateTime<Utc>,
    pub consecutive_misses: u32,
    pub reliability_score: f64,
}

/// Health tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Misses at which a feed becomes Degraded.
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u32,

    /// Misses at which a feed becomes Offline.
    #[serde(default = "default_offline_threshold")]
    pub offline_threshold: u32,

    /// Expected heartbeat interval (ms).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,

    /// Number of recent expected arrivals in the reliability window.
    #[serde(default = "default_reliability_window")]
    pub reliability_window: usize,

    /// Weight of the previous reliability score in the moving average.
    #[serde(default = "default_reliability_decay")]
    pub reliability_decay: f64,
}

fn default_degraded_threshold() -> u32 {
    1
}
fn default_offline_threshold() -> u32 {
    3
}
fn default_timeout_ms() -> i64 {
    60_000
}
fn default_reliability_window() -> usize {
    50
}
fn default_reliability_decay() -> f64 {
    0.9
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_threshold: default_degraded_threshold(),
            offline_threshold: default_offline_threshold(),
            timeout_ms: default_timeout_ms(),
            reliability_window: default_reliability_window(),
            reliability_decay: default_reliability_decay(),
        }
    }
}

impl HealthConfig {
    pub fn validate(&self) -> FeedResult<()> {
        if self.degraded_threshold == 0 {
            return Err(FeedError::ConfigError(
                "health.degraded_threshold must be at least 1".to_string(),
            ));
        }
        if self.offline_threshold < self.degraded_threshold {
            return Err(FeedError::ConfigError(format!(
                "health.offline_threshold ({}) must be >= degraded_threshold ({})",
                self.offline_threshold, self.degraded_threshold
            )));
        }
        if self.timeout_ms <= 0 {
            return Err(FeedError::ConfigError(
                "health.timeout_ms must be positive".to_string(),
            ));
        }
        if self.reliability_window == 0 {
            return Err(FeedError::ConfigError(
                "health.reliability_window must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.reliability_decay) {
            return Err(FeedError::ConfigError(format!(
                "health.reliability_decay ({}) must be within [0, 1)",
                self.reliability_decay
            )));
        }
        Ok(())
    }

    fn status_for(&self, misses: u32) -> SourceStatus {
        if misses >= self.offline_threshold {
            SourceStatus::Offline
        } else if misses >= self.degraded_threshold {
            SourceStatus::Degraded
        } else {
            SourceStatus::Healthy
        }
    }
}

/// Mutable per-feed state, only touched under the feed's map shard lock.
#[derive(Debug, Clone)]
struct FeedHealthState {
    last_update: DateTime<Utc>,
    consecutive_misses: u32,
    /// Misses attributed by `tick`/`record_miss` since the last observation.
    misses_since_update: u32,
    /// Rolling window of expected arrivals: `true` = on time.
    arrivals: VecDeque<bool>,
    reliability: f64,
    ever_missed: bool,
    status: SourceStatus,
}

impl FeedHealthState {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            last_update: at,
            consecutive_misses: 0,
            misses_since_update: 0,
            arrivals: VecDeque::new(),
            reliability: 1.0,
            ever_missed: false,
            status: SourceStatus::Healthy,
        }
    }

    fn push_arrival(&mut self, on_time: bool, window: usize) {
        if !on_time {
            self.ever_missed = true;
        }
        self.arrivals.push_back(on_time);
        while self.arrivals.len() > window {
            self.arrivals.pop_front();
        }
    }

    fn push_misses(&mut self, count: u32, window: usize) {
        // Anything past the window would be evicted immediately.
        let count = (count as usize).min(window);
        for _ in 0..count {
            self.push_arrival(false, window);
        }
    }

    fn recompute_reliability(&mut self, decay: f64) {
        if self.arrivals.is_empty() {
            return;
        }
        let on_time = self.arrivals.iter().filter(|a| **a).count() as f64;
        let ratio = on_time / self.arrivals.len() as f64;
        let mut score = decay * self.reliability + (1.0 - decay) * ratio;
        if self.ever_missed {
            score = score.min(RECOVERED_RELIABILITY_CAP);
        }
        self.reliability = score.clamp(0.0, 1.0);
    }

    fn snapshot(&self, key: &FeedKey) -> SourceHealth {
        SourceHealth {
            source: key.source.clone(),
            asset: key.asset.clone(),
            status: self.status,
            last_update: self.last_update,
            consecutive_misses: self.consecutive_misses,
            reliability_score: self.reliability,
        }
    }
}

/// Tracks heartbeat health of every (asset, source) feed.
pub struct SourceHealthTracker {
    config: HealthConfig,
    feeds: DashMap<FeedKey, FeedHealthState>,
}

impl SourceHealthTracker {
    #[must_use]
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            feeds: DashMap::new(),
        }
    }

    #[must_use]
    pub fn new_shared(config: HealthConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Update health from an accepted observation.
    ///
    /// Observations older than the feed's last update leave the state untouched.
    pub fn update(&self, obs: &PriceObservation) -> SourceHealth {
        let key = obs.feed_key();
        let config = &self.config;
        let mut entry = self
            .feeds
            .entry(key.clone())
            .or_insert_with(|| FeedHealthState::new(obs.observed_at));
        let state = entry.value_mut();

        let gap_ms = (obs.observed_at - state.last_update).num_milliseconds();
        if gap_ms < 0 {
            return state.snapshot(&key);
        }

        let before = state.status;
        if gap_ms <= config.timeout_ms {
            state.consecutive_misses = 0;
            state.push_arrival(true, config.reliability_window);
        } else {
            let intervals = u32::try_from(gap_ms / config.timeout_ms)
                .unwrap_or(u32::MAX)
                .max(1);
            let new_misses = intervals.saturating_sub(state.misses_since_update);
            state.consecutive_misses = state.consecutive_misses.saturating_add(new_misses);
            state.push_misses(new_misses, config.reliability_window);
        }
        state.misses_since_update = 0;
        state.last_update = obs.observed_at;
        state.recompute_reliability(config.reliability_decay);
        state.status = config.status_for(state.consecutive_misses);

        log_transition(&key, before, state);
        state.snapshot(&key)
    }

    /// Record one missed update (e.g. a failed or timed-out fetch).
    pub fn record_miss(&self, asset: &AssetId, source: &SourceId, at: DateTime<Utc>) -> SourceHealth {
        let key = FeedKey::new(asset.clone(), source.clone());
        let config = &self.config;
        let mut entry = self
            .feeds
            .entry(key.clone())
            .or_insert_with(|| FeedHealthState::new(at));
        let state = entry.value_mut();

        let before = state.status;
        state.consecutive_misses = state.consecutive_misses.saturating_add(1);
        state.misses_since_update = state.misses_since_update.saturating_add(1);
        state.push_arrival(false, config.reliability_window);
        state.recompute_reliability(config.reliability_decay);
        state.status = config.status_for(state.consecutive_misses);

        log_transition(&key, before, state);
        state.snapshot(&key)
    }

    /// Attribute timeouts for feeds that have gone quiet.
    ///
    /// A feed silent for `k * timeout_ms` has `k` misses attributed in total,
    /// however often `tick` is called. Returns feeds whose status changed.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<SourceHealth> {
        let config = &self.config;
        let mut changed = Vec::new();
        for mut entry in self.feeds.iter_mut() {
            let key = entry.key().clone();
            let state = entry.value_mut();

            let elapsed_ms = (now - state.last_update).num_milliseconds();
            if elapsed_ms <= config.timeout_ms {
                continue;
            }
            let expected = u32::try_from(elapsed_ms / config.timeout_ms).unwrap_or(u32::MAX);
            if expected <= state.misses_since_update {
                continue;
            }
            let new_misses = expected - state.misses_since_update;
            let before = state.status;
            state.misses_since_update = expected;
            state.consecutive_misses = state.consecutive_misses.saturating_add(new_misses);
            state.push_misses(new_misses, config.reliability_window);
            state.recompute_reliability(config.reliability_decay);
            state.status = config.status_for(state.consecutive_misses);

            log_transition(&key, before, state);
            if state.status != before {
                changed.push(state.snapshot(&key));
            }
        }
        changed
    }

    /// Health of one feed, if it has ever been seen.
    pub fn get(&self, asset: &AssetId, source: &SourceId) -> Option<SourceHealth> {
        let key = FeedKey::new(asset.clone(), source.clone());
        self.feeds.get(&key).map(|s| s.value().snapshot(&key))
    }

    /// Health of every source of an asset, ordered by source id.
    pub fn snapshot(&self, asset: &AssetId) -> Vec<SourceHealth> {
        let mut out: Vec<SourceHealth> = self
            .feeds
            .iter()
            .filter(|e| &e.key().asset == asset)
            .map(|e| e.value().snapshot(e.key()))
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        out
    }

    /// Sources of an asset that are not Offline.
    pub fn usable_sources(&self, asset: &AssetId) -> Vec<SourceId> {
        self.snapshot(asset)
            .into_iter()
            .filter(|h| h.status != SourceStatus::Offline)
            .map(|h| h.source)
            .collect()
    }

    /// Whether a source may contribute to consensus. Unknown sources are usable.
    pub fn is_usable(&self, asset: &AssetId, source: &SourceId) -> bool {
        self.get(asset, source)
            .map_or(true, |h| h.status != SourceStatus::Offline)
    }
}

fn log_transition(key: &FeedKey, before: SourceStatus, state: &FeedHealthState) {
    if before == state.status {
        return;
    }
    match state.status {
        SourceStatus::Healthy => info!(
            feed = %key,
            from = %before,
            reliability = state.reliability,
            "Source recovered"
        ),
        SourceStatus::Degraded | SourceStatus::Offline => warn!(
            feed = %key,
            from = %before,
            to = %state.status,
            misses = state.consecutive_misses,
            reliability = state.reliability,
            "Source health degraded"
        ),
    }
    debug!(feed = %key, last_update = %state.last_update, "Health state changed");
}
