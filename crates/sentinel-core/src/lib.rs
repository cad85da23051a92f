//! Core domain types for the oracle sentinel.
//!
//! This crate provides the fundamental types shared by every component:
//! - `AssetId`, `SourceId`, `FeedKey`: identify an (asset, source) price feed
//! - `Price`, `Confidence`: precision-safe numeric types
//! - `PriceObservation`: an immutable price report from one oracle source
//! - `ConsensusMethod` and the pure aggregation math behind it

pub mod aggregation;
pub mod decimal;
pub mod error;
pub mod ids;
pub mod observation;

pub use aggregation::{
    aggregate, max_relative_spread, median, trimmed_mean, weighted_average, ConsensusMethod,
};
pub use decimal::{Confidence, Price};
pub use error::{CoreError, RejectedReason, Result};
pub use ids::{AssetId, FeedKey, SourceId};
pub use observation::{BlockNumber, PriceObservation};
