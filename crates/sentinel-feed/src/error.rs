//! Feed error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type FeedResult<T> = Result<T, FeedError>;
