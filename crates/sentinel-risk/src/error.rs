//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Alert channel full, assessment {0} dropped")]
    AlertBackpressure(String),

    #[error("Alert channel closed")]
    AlertChannelClosed,
}

pub type RiskResult<T> = Result<T, RiskError>;
