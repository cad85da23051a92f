//! Engine error types.

use sentinel_core::{AssetId, CoreError};
use sentinel_detector::DetectorError;
use sentinel_feed::FeedError;
use sentinel_proof::ProofError;
use sentinel_risk::RiskError;
use sentinel_telemetry::TelemetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load failed: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("No observations for asset {0}")]
    UnknownAsset(AssetId),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("Proof error: {0}")]
    Proof(#[from] ProofError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
