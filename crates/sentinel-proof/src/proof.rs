//! Proof objects, statement encoding, verification and opening.

use alloy::primitives::{keccak256, B256};
use chrono::{DateTime, Utc};
use sentinel_core::AssetId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{ProofVerifier, VerificationKey, VerifierRegistry};
use crate::commitment::{commit_method, commit_prices, Digest, PrivateInputs, PublicOutputs, PublicSignals};
use crate::error::{ProofError, ProofResult};

/// Proof that a published price was derived from committed inputs.
///
/// Immutable once generated. Verifiable from `public_signals`,
/// `consensus_proof` and a verification key alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentProof {
    pub proof_id: String,
    pub asset: AssetId,
    pub price_commitment: Digest,
    pub method_commitment: Digest,
    /// Backend proof bytes over the statement digest.
    #[serde(with = "crate::commitment::hex_bytes")]
    pub consensus_proof: Vec<u8>,
    pub public_signals: PublicSignals,
    /// Backend scheme that produced `consensus_proof`.
    pub scheme: String,
    pub created_at: DateTime<Utc>,
}

impl CommitmentProof {
    /// Digest the backend signs, computed against the given signals.
    pub fn statement_digest(&self, public_signals: &PublicSignals) -> ProofResult<B256> {
        ProofStatement {
            proof_id: &self.proof_id,
            asset: &self.asset,
            price_commitment: &self.price_commitment,
            method_commitment: &self.method_commitment,
            public_signals: public_signals.canonical(),
            scheme: &self.scheme,
            created_at_ms: self.created_at.timestamp_millis(),
        }
        .digest()
    }
}

/// Canonical statement bound by the proof bytes.
#[derive(Serialize)]
pub(crate) struct ProofStatement<'a> {
    pub proof_id: &'a str,
    pub asset: &'a AssetId,
    pub price_commitment: &'a Digest,
    pub method_commitment: &'a Digest,
    pub public_signals: PublicSignals,
    pub scheme: &'a str,
    pub created_at_ms: i64,
}

impl ProofStatement<'_> {
    pub(crate) fn digest(&self) -> ProofResult<B256> {
        let encoded =
            rmp_serde::to_vec_named(self).map_err(|e| ProofError::Serialization(e.to_string()))?;
        Ok(keccak256(&encoded))
    }
}

/// Verify a proof against public signals and a published key, using the
/// default verifier for the key's scheme.
///
/// Never needs the private inputs. Any change to the signals, commitments,
/// id, asset or timestamp after generation makes this return `false`.
pub fn verify(proof: &CommitmentProof, public_signals: &PublicSignals, key: &VerificationKey) -> bool {
    verify_in(&VerifierRegistry::default(), proof, public_signals, key)
}

/// Like [`verify`], looking the scheme up in `verifiers`.
pub fn verify_in(
    verifiers: &VerifierRegistry,
    proof: &CommitmentProof,
    public_signals: &PublicSignals,
    key: &VerificationKey,
) -> bool {
    match verifiers.get(&key.scheme) {
        Some(verifier) => verify_with(verifier.as_ref(), proof, public_signals, key),
        None => {
            debug!(proof_id = %proof.proof_id, scheme = %key.scheme, "No verifier for scheme");
            false
        }
    }
}

/// Verify with a specific verifier, which must handle the key's scheme.
pub fn verify_with<V: ProofVerifier + ?Sized>(
    verifier: &V,
    proof: &CommitmentProof,
    public_signals: &PublicSignals,
    key: &VerificationKey,
) -> bool {
    if verifier.scheme() != key.scheme || proof.scheme != key.scheme {
        return false;
    }
    if !public_signals.is_well_formed() {
        return false;
    }
    if public_signals.canonical() != proof.public_signals.canonical() {
        debug!(proof_id = %proof.proof_id, "Public signals differ from the proof's signals");
        return false;
    }
    match proof.statement_digest(public_signals) {
        Ok(digest) => verifier.verify(&digest, &proof.consensus_proof, key),
        Err(_) => false,
    }
}

/// Audit path: check that private inputs and the claimed outputs open the
/// proof's commitments and reproduce its public signals.
pub fn open(proof: &CommitmentProof, outputs: &PublicOutputs, inputs: &PrivateInputs) -> bool {
    if outputs.asset != proof.asset || outputs.check_consistent(inputs).is_err() {
        return false;
    }
    let prices_match = commit_prices(inputs)
        .map(|c| c == proof.price_commitment)
        .unwrap_or(false);
    let method_match = commit_method(outputs.method, outputs.trim_fraction, &inputs.method_salt)
        .map(|c| c == proof.method_commitment)
        .unwrap_or(false);

    let signals = &proof.public_signals;
    let aggregated = outputs.aggregated_price.inner();
    let signals_match = signals.source_count == inputs.prices.len()
        && signals.aggregated_price_bound.lower <= aggregated
        && aggregated <= signals.aggregated_price_bound.upper;

    prices_match && method_match && signals_match
}
