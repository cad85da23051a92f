//! Oracle sentinel entry point.
//!
//! With `--replay`, feeds recorded observations through the engine and prints
//! a JSON summary per asset. Without it, runs health and retention upkeep
//! until Ctrl-C; live fetchers are supplied by the embedding application.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use sentinel_engine::{replay_file, summarize, EngineConfig, OracleGuard};
use sentinel_risk::{AlertDeduplicator, RiskAssessment};
use sentinel_telemetry::LogFormat;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Oracle risk-management and manipulation-detection engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SENTINEL_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON Lines file of recorded observations to replay
    #[arg(short, long)]
    replay: Option<PathBuf>,

    /// Log format: pretty, compact or json (can also be set via SENTINEL_LOG_FORMAT)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.log_format.as_deref() {
        Some(format) => sentinel_telemetry::init_logging_with(
            format.parse::<LogFormat>()?,
            sentinel_telemetry::logging::filter_from_env()?,
        )?,
        None => sentinel_telemetry::init_logging()?,
    }

    info!("Starting oracle sentinel v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SENTINEL_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SENTINEL_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = EngineConfig::load(&config_path)?;
    let guard = OracleGuard::new(config)?;

    let cancel = CancellationToken::new();
    let alerts = tokio::spawn(log_alerts(guard.subscribe_alerts(), cancel.clone()));

    match args.replay {
        Some(path) => {
            info!(path = %path.display(), "Replaying observations");
            let report = replay_file(&guard, &path)?;
            let summaries = summarize(&guard).await;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "replay": report,
                    "assets": summaries,
                }))?
            );
        }
        None => run_upkeep(&guard, cancel.clone()).await,
    }

    cancel.cancel();
    alerts.await?;
    info!("Oracle sentinel stopped");
    Ok(())
}

/// Log each distinct actionable assessment once.
async fn log_alerts(mut rx: mpsc::Receiver<RiskAssessment>, cancel: CancellationToken) {
    let mut dedup = AlertDeduplicator::new(4096);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Drain what was emitted before shutdown.
                while let Ok(assessment) = rx.try_recv() {
                    log_alert(&mut dedup, &assessment);
                }
                break;
            }
            received = rx.recv() => {
                let Some(assessment) = received else { break };
                log_alert(&mut dedup, &assessment);
            }
        }
    }
}

fn log_alert(dedup: &mut AlertDeduplicator, assessment: &RiskAssessment) {
    if !dedup.observe(assessment) {
        return;
    }
    warn!(
        id = %assessment.assessment_id,
        asset = %assessment.asset,
        action = %assessment.recommended_action,
        score = assessment.risk_score,
        patterns = ?assessment.matched_patterns,
        "Risk alert"
    );
}

/// Tick source health and prune the store until Ctrl-C.
async fn run_upkeep(guard: &OracleGuard, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_millis(guard.config().poller.interval_ms));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                cancel.cancel();
                break;
            }
            _ = ticker.tick() => {
                guard.tick(Utc::now());
                guard.evaluate_all().await;
            }
        }
    }
}
