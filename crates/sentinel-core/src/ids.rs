//! Asset and source identification.
//!
//! A price feed is the pair of an asset (e.g. `cUSD`) and an independent
//! oracle source reporting it (e.g. `chainlink`). `FeedKey` is the primary
//! key for per-feed state in the store and the health tracker.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_ID_LEN: usize = 64;

fn validate_id(kind: &str, raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(CoreError::InvalidId(format!("{kind} must not be empty")));
    }
    if raw.len() > MAX_ID_LEN {
        return Err(CoreError::InvalidId(format!(
            "{kind} longer than {MAX_ID_LEN} bytes"
        )));
    }
    if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CoreError::InvalidId(format!(
            "{kind} contains whitespace or control characters: {raw:?}"
        )));
    }
    Ok(())
}

/// Asset identifier (e.g. `cUSD`, `CELO`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetId(String);

impl AssetId {
    /// Create a validated asset id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id("asset id", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AssetId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Oracle source identifier (e.g. `chainlink`, `band`, `tellor`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceId(String);

impl SourceId {
    /// Create a validated source id.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_id("source id", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SourceId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SourceId> for String {
    fn from(id: SourceId) -> Self {
        id.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique feed identifier combining asset and source.
///
/// Format: `{asset}@{source}` (e.g. "cUSD@chainlink").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeedKey {
    pub asset: AssetId,
    pub source: SourceId,
}

impl FeedKey {
    pub fn new(asset: AssetId, source: SourceId) -> Self {
        Self { asset, source }
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.asset, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_key_display() {
        let key = FeedKey::new(
            AssetId::new("cUSD").unwrap(),
            SourceId::new("chainlink").unwrap(),
        );
        assert_eq!(key.to_string(), "cUSD@chainlink");
    }

    #[test]
    fn test_ids_reject_bad_input() {
        assert!(AssetId::new("").is_err());
        assert!(AssetId::new("c USD").is_err());
        assert!(SourceId::new("band\n").is_err());
        assert!(SourceId::new("x".repeat(65)).is_err());
        assert!(SourceId::new("x".repeat(64)).is_ok());
    }

    #[test]
    fn test_ids_serde_roundtrip_validates() {
        let asset = AssetId::new("CELO").unwrap();
        assert_eq!(serde_json::to_string(&asset).unwrap(), "\"CELO\"");

        let bad: std::result::Result<SourceId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
