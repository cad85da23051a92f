//! Consecutive drift windows per asset.
//!
//! Evaluation windows are aligned to `window_size_ms` buckets. The streak
//! advances only between adjacent buckets; re-evaluating the same bucket
//! replaces its result instead of counting twice, and a skipped bucket
//! breaks the streak.

use dashmap::DashMap;
use sentinel_core::AssetId;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct DriftState {
    bucket: i64,
    /// Streak of the bucket before `bucket`.
    prior: u32,
    /// Streak including `bucket`.
    streak: u32,
}

pub struct DriftStreakTracker {
    window_size_ms: i64,
    states: DashMap<AssetId, DriftState>,
}

impl DriftStreakTracker {
    pub fn new(window_size_ms: i64) -> Self {
        Self {
            window_size_ms: window_size_ms.max(1),
            states: DashMap::new(),
        }
    }

    fn bucket(&self, window_end_ms: i64) -> i64 {
        window_end_ms.div_euclid(self.window_size_ms)
    }

    fn prior_for(state: Option<&DriftState>, bucket: i64) -> u32 {
        match state {
            Some(s) if s.bucket == bucket => s.prior,
            Some(s) if s.bucket + 1 == bucket => s.streak,
            _ => 0,
        }
    }

    /// Drift windows immediately preceding the window ending at `window_end_ms`.
    pub fn prior(&self, asset: &AssetId, window_end_ms: i64) -> u32 {
        let bucket = self.bucket(window_end_ms);
        let state = self.states.get(asset).map(|s| *s.value());
        Self::prior_for(state.as_ref(), bucket)
    }

    /// Store the streak the detector reported for this window.
    ///
    /// Results for windows older than the latest recorded one are ignored.
    pub fn record(&self, asset: &AssetId, window_end_ms: i64, streak: u32) {
        let bucket = self.bucket(window_end_ms);
        let mut entry = self.states.entry(asset.clone()).or_insert(DriftState {
            bucket,
            prior: 0,
            streak: 0,
        });
        let state = entry.value_mut();
        if bucket < state.bucket {
            return;
        }
        let prior = Self::prior_for(Some(&*state), bucket);
        *state = DriftState {
            bucket,
            prior,
            streak,
        };
        if streak > 0 {
            debug!(%asset, bucket, streak, "Drift streak updated");
        }
    }
}
