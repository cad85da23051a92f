//! Detector error types.

use sentinel_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Fewer distinct sources than `min_sources` in the window.
    #[error("Insufficient sources: {found} present, {required} required")]
    InsufficientSources { required: usize, found: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DetectorError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "config",
            Self::InsufficientSources { .. } => "insufficient_sources",
            Self::InvalidInput(_) => "invalid_input",
            Self::Core(_) => "aggregation",
        }
    }
}

pub type DetectorResult<T> = Result<T, DetectorError>;
