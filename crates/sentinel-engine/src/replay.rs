//! Offline replay of recorded observations.
//!
//! Input is JSON Lines, one `ReplayRecord` per line. Blank lines and lines
//! starting with `#` are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sentinel_core::AssetId;
use sentinel_detector::ConsensusResult;
use sentinel_feed::SourceHealth;
use sentinel_risk::RiskAssessment;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::OracleGuard;
use crate::error::EngineResult;

fn default_confidence() -> Decimal {
    Decimal::ONE
}

/// One recorded observation, as submitted through the ingestion interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub asset: String,
    pub source: String,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub reported_block: Option<u64>,
    #[serde(default = "default_confidence")]
    pub confidence: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub accepted: usize,
    pub rejected: usize,
    pub unparsable: usize,
}

/// Consensus, risk and health of one asset after a replay.
#[derive(Debug, Clone, Serialize)]
pub struct AssetSummary {
    pub asset: AssetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
    pub health: Vec<SourceHealth>,
}

/// Submit every record from `reader`, in order.
pub fn replay_lines<R: BufRead>(guard: &OracleGuard, reader: R) -> EngineResult<ReplayReport> {
    let mut report = ReplayReport::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: ReplayRecord = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Unparsable replay record");
                report.unparsable += 1;
                continue;
            }
        };
        let submitted = guard.submit_observation(
            &record.asset,
            &record.source,
            record.price,
            record.observed_at,
            record.reported_block,
            record.confidence,
        );
        match submitted {
            Ok(()) => report.accepted += 1,
            Err(_) => report.rejected += 1,
        }
    }
    info!(
        accepted = report.accepted,
        rejected = report.rejected,
        unparsable = report.unparsable,
        "Replay complete"
    );
    Ok(report)
}

pub fn replay_file(guard: &OracleGuard, path: &Path) -> EngineResult<ReplayReport> {
    let file = File::open(path)?;
    replay_lines(guard, BufReader::new(file))
}

/// Evaluate every asset and collect its consensus, risk and health.
pub async fn summarize(guard: &OracleGuard) -> Vec<AssetSummary> {
    let mut summaries = Vec::new();
    for (asset, risk) in guard.evaluate_all().await {
        let (consensus, consensus_error) = match guard.get_consensus(&asset) {
            Ok(c) => (Some(c), None),
            Err(e) => (None, Some(e.to_string())),
        };
        let risk = match risk {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(%asset, error = %e, "Evaluation failed");
                None
            }
        };
        summaries.push(AssetSummary {
            health: guard.get_source_health(&asset),
            asset,
            consensus,
            consensus_error,
            risk,
        });
    }
    summaries
}
