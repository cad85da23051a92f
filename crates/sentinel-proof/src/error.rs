//! Proof error types.

use rust_decimal::Decimal;
use sentinel_core::CoreError;
use thiserror::Error;

use crate::keys::KeyError;

/// Proof generation errors.
///
/// A failed proof never affects consensus or risk evaluation; it is surfaced
/// only to whoever requested the proof.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("Invalid private inputs: {0}")]
    InvalidInputs(String),

    #[error("Public outputs inconsistent with inputs: claimed {claimed}, derived {derived}")]
    InconsistentOutputs { claimed: Decimal, derived: Decimal },

    #[error("Statement serialization failed: {0}")]
    Serialization(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] alloy::signers::Error),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Proof task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ProofResult<T> = Result<T, ProofError>;
