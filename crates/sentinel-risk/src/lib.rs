//! Risk scoring and alerting for the oracle sentinel.
//!
//! - `RiskScorer`: pattern severity + rule table + worst feature, mapped to an action
//! - `RiskConfig`: tunable weights and per-asset thresholds
//! - `AlertEmitter`: pushes actionable assessments to registered sinks
//! - `AlertDeduplicator`: receiver-side idempotency by assessment id

pub mod alert;
pub mod config;
pub mod error;
pub mod scorer;

pub use alert::{AlertDeduplicator, AlertEmitter, AlertSink, ChannelAlertSink};
pub use config::{ComponentWeights, RiskConfig, RuleEntry, SeverityWeights, ThresholdOverride};
pub use error::{RiskError, RiskResult};
pub use scorer::{RecommendedAction, RiskAssessment, RiskScorer, ScoreBreakdown};
