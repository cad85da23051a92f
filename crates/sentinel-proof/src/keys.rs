//! Attester key loading.
//!
//! Security notes:
//! - Key material is parsed into `Zeroizing` buffers and handed straight to
//!   `PrivateKeySigner`; the hex text is never kept around.
//! - Keys are loaded once at startup; no runtime key rotation.
//! - Never log private key material.

use std::path::PathBuf;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Where the attester's private key comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeySource {
    /// Hex key in an environment variable (development).
    EnvVar { var_name: String },
    /// Hex key in a file (production, recommend 0600 permissions).
    File { path: PathBuf },
    /// Random key generated at startup. Proofs cannot be verified across restarts.
    #[default]
    Ephemeral,
}

/// Key management errors.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Failed to decode hex: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn parse_hex_key(hex_str: &str) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    Ok(Zeroizing::new(hex::decode(trimmed)?))
}

/// Load the attester signer and optionally check its address.
///
/// # Errors
/// Returns `KeyError` if the variable or file is missing, the hex is
/// malformed, the key is not a valid secp256k1 scalar, or the derived
/// address differs from `expected`.
pub fn load_signer(
    source: &KeySource,
    expected: Option<Address>,
) -> Result<PrivateKeySigner, KeyError> {
    let signer = match source {
        KeySource::EnvVar { var_name } => {
            let raw = Zeroizing::new(
                std::env::var(var_name).map_err(|_| KeyError::EnvVarNotFound(var_name.clone()))?,
            );
            signer_from_slice(&parse_hex_key(&raw)?)?
        }
        KeySource::File { path } => {
            let raw = Zeroizing::new(std::fs::read_to_string(path)?);
            signer_from_slice(&parse_hex_key(&raw)?)?
        }
        KeySource::Ephemeral => {
            let signer = PrivateKeySigner::random();
            warn!(
                attester = %signer.address(),
                "No attester key configured, using an ephemeral key"
            );
            signer
        }
    };

    if let Some(expected) = expected {
        if signer.address() != expected {
            return Err(KeyError::AddressMismatch {
                expected,
                actual: signer.address(),
            });
        }
    }

    info!(attester = %signer.address(), "Attester key loaded");
    Ok(signer)
}

/// Build a signer from raw secret bytes.
pub fn signer_from_slice(secret: &[u8]) -> Result<PrivateKeySigner, KeyError> {
    PrivateKeySigner::from_slice(secret).map_err(|e| KeyError::InvalidKey(e.to_string()))
}
