//! Consensus and manipulation detection for the oracle sentinel.
//!
//! - `ConsensusCalculator`: aggregate the newest price of each source
//! - `BehavioralFeatures`: normalized statistics over an observation window
//! - `PatternCatalog`: static manipulation patterns built from configuration
//! - `ManipulationDetector`: stateless feature extraction + pattern matching
//! - `DriftStreakTracker`: per-asset consecutive-window counter for gradual drift

pub mod config;
pub mod consensus;
pub mod detector;
pub mod drift;
pub mod error;
pub mod features;
pub mod patterns;

pub use config::{
    ConsensusConfig, CoordinatedAttackConfig, FlashLoanConfig, FrontRunningConfig,
    GradualDriftConfig, PatternConfig,
};
pub use consensus::{ConsensusCalculator, ConsensusResult};
pub use detector::{Analysis, AnalysisWindow, ManipulationDetector};
pub use drift::DriftStreakTracker;
pub use error::{DetectorError, DetectorResult};
pub use features::{BehavioralFeatures, Feature};
pub use patterns::{
    Comparison, FeatureThreshold, ManipulationPattern, PatternCatalog, PatternId, PatternMatch,
    Severity,
};
