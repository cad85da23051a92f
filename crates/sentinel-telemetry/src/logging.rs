//! Structured logging for the sentinel binary.
//!
//! Logs go to stderr so replay summaries printed on stdout stay
//! machine-readable.

use std::fmt as std_fmt;
use std::str::FromStr;

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: risk decisions and alerts at debug,
/// ingestion and proofs at info.
pub const DEFAULT_FILTER: &str =
    "info,sentinel_engine=debug,sentinel_detector=debug,sentinel_risk=debug,sentinel_feed=info,sentinel_proof=info";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-oriented.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

impl LogFormat {
    /// Pick a format from `SENTINEL_LOG_FORMAT`, falling back to JSON when
    /// `RUST_ENV=production` and pretty otherwise.
    pub fn from_env() -> TelemetryResult<Self> {
        Self::resolve(
            std::env::var("SENTINEL_LOG_FORMAT").ok().as_deref(),
            std::env::var("RUST_ENV").ok().as_deref(),
        )
    }

    /// An explicit format wins over the deployment environment.
    pub fn resolve(explicit: Option<&str>, rust_env: Option<&str>) -> TelemetryResult<Self> {
        match explicit {
            Some(s) if !s.trim().is_empty() => s.parse(),
            _ if rust_env == Some("production") => Ok(Self::Json),
            _ => Ok(Self::Pretty),
        }
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::LoggingInit(format!(
                "unknown log format {other:?} (expected pretty, compact or json)"
            ))),
        }
    }
}

impl std_fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// `RUST_LOG` when set, [`DEFAULT_FILTER`] otherwise. An invalid `RUST_LOG`
/// is an error rather than a silent fallback.
pub fn filter_from_env() -> TelemetryResult<EnvFilter> {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    EnvFilter::try_new(&directives)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid filter {directives:?}: {e}")))
}

/// Initialize logging from the environment.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging() -> TelemetryResult<()> {
    init_logging_with(LogFormat::from_env()?, filter_from_env()?)
}

/// Initialize logging with an explicit format and filter.
pub fn init_logging_with(format: LogFormat, filter: EnvFilter) -> TelemetryResult<()> {
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
