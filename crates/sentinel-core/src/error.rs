//! Error types for sentinel-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid confidence: {0}")]
    InvalidConfidence(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Why an observation was not recorded.
///
/// Returned synchronously to the submitter; the observation is simply dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectedReason {
    /// Older than the newest stored observation for the feed by more than the skew tolerance.
    #[error("stale observation: {lag_ms}ms behind newest (tolerance {tolerance_ms}ms)")]
    Stale { lag_ms: i64, tolerance_ms: i64 },

    /// Same (source, observed_at) already recorded.
    #[error("replayed observation at {observed_at_ms}")]
    Replay { observed_at_ms: i64 },

    /// Failed boundary validation.
    #[error("malformed observation: {0}")]
    Malformed(String),
}

impl RejectedReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stale { .. } => "stale",
            Self::Replay { .. } => "replay",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<CoreError> for RejectedReason {
    fn from(e: CoreError) -> Self {
        Self::Malformed(e.to_string())
    }
}
