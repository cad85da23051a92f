//! Oracle risk-management engine.
//!
//! `OracleGuard` wires the observation store, source health tracking,
//! consensus, manipulation detection, risk scoring, alerting and proof
//! generation behind one cloneable handle. `FeedPoller` drives external
//! `PriceFetcher`s into it.

pub mod config;
pub mod engine;
pub mod error;
pub mod poller;
pub mod replay;

pub use config::{EngineConfig, EngineSection, PollerConfig};
pub use engine::OracleGuard;
pub use error::{EngineError, EngineResult};
pub use poller::{FeedPoller, PollSummary};
pub use replay::{replay_file, replay_lines, summarize, AssetSummary, ReplayRecord, ReplayReport};
