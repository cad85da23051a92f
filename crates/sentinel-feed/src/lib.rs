//! Price feed plumbing for the oracle sentinel.
//!
//! - `ObservationStore`: bounded, per-feed ring buffers of price observations
//! - `SourceHealthTracker`: per-feed heartbeat, miss counting and reliability
//! - `PriceFetcher`: interface to the blockchain-oracle collaborators

pub mod error;
pub mod fetch;
pub mod health;
pub mod store;

pub use error::{FeedError, FeedResult};
pub use fetch::{BoxFuture, DynPriceFetcher, FetchError, PriceFetcher};
pub use health::{HealthConfig, SourceHealth, SourceHealthTracker, SourceStatus};
pub use store::{ObservationStore, StoreConfig, StoreHandle};
