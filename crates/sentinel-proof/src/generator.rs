//! Proof generation service.
//!
//! `commit` is synchronous and CPU-bound; `generate` runs it on the blocking
//! pool so callers on the ingestion path only ever await a future.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{AttestationBackend, ProofBackend, ProofVerifier, VerificationKey};
use crate::commitment::{commit_method, commit_prices, PrivateInputs, PublicOutputs, PublicSignals};
use crate::error::{ProofError, ProofResult};
use crate::keys::{load_signer, KeySource};
use crate::proof::{self, CommitmentProof, ProofStatement};

fn default_publish_decimals() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofConfig {
    /// Decimal places of the published price and deviation bounds.
    #[serde(default = "default_publish_decimals")]
    pub publish_decimals: u32,

    #[serde(default)]
    pub key: KeySource,

    /// Startup fails if the loaded key does not match this address.
    #[serde(default)]
    pub expected_attester: Option<String>,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            publish_decimals: default_publish_decimals(),
            key: KeySource::default(),
            expected_attester: None,
        }
    }
}

impl ProofConfig {
    pub fn validate(&self) -> ProofResult<()> {
        self.expected_attester()?;
        if self.publish_decimals > 18 {
            return Err(ProofError::InvalidInputs(format!(
                "publish_decimals must be <= 18, got {}",
                self.publish_decimals
            )));
        }
        Ok(())
    }

    pub fn expected_attester(&self) -> ProofResult<Option<Address>> {
        self.expected_attester
            .as_deref()
            .map(|s| {
                Address::from_str(s.trim()).map_err(|e| {
                    ProofError::InvalidInputs(format!("expected_attester {s}: {e}"))
                })
            })
            .transpose()
    }
}

pub struct ProofGenerator {
    backend: Arc<dyn ProofBackend>,
    publish_decimals: u32,
}

impl ProofGenerator {
    pub fn new(backend: Arc<dyn ProofBackend>, publish_decimals: u32) -> Self {
        Self {
            backend,
            publish_decimals,
        }
    }

    /// Build the attestation-backed generator described by `config`.
    pub fn from_config(config: &ProofConfig) -> ProofResult<Self> {
        config.validate()?;
        let signer = load_signer(&config.key, config.expected_attester()?)?;
        Ok(Self::new(
            Arc::new(AttestationBackend::new(signer)),
            config.publish_decimals,
        ))
    }

    pub fn verification_key(&self) -> VerificationKey {
        self.backend.verification_key()
    }

    pub fn commit(
        &self,
        inputs: &PrivateInputs,
        outputs: &PublicOutputs,
    ) -> ProofResult<CommitmentProof> {
        self.commit_at(inputs, outputs, Uuid::new_v4().to_string(), Utc::now())
    }

    /// Commit with an explicit id and timestamp.
    pub fn commit_at(
        &self,
        inputs: &PrivateInputs,
        outputs: &PublicOutputs,
        proof_id: String,
        created_at: DateTime<Utc>,
    ) -> ProofResult<CommitmentProof> {
        inputs.validate()?;
        outputs.check_consistent(inputs)?;

        let price_commitment = commit_prices(inputs)?;
        let method_commitment =
            commit_method(outputs.method, outputs.trim_fraction, &inputs.method_salt)?;
        let public_signals = PublicSignals::derive(
            inputs,
            outputs.aggregated_price.inner(),
            self.publish_decimals,
        )?;
        let scheme = self.backend.scheme();

        let digest = ProofStatement {
            proof_id: &proof_id,
            asset: &outputs.asset,
            price_commitment: &price_commitment,
            method_commitment: &method_commitment,
            public_signals: public_signals.clone(),
            scheme,
            created_at_ms: created_at.timestamp_millis(),
        }
        .digest()?;
        let consensus_proof = self.backend.prove(&digest)?;

        debug!(
            %proof_id,
            asset = %outputs.asset,
            price_commitment = %price_commitment,
            sources = public_signals.source_count,
            "Commitment proof built"
        );

        Ok(CommitmentProof {
            proof_id,
            asset: outputs.asset.clone(),
            price_commitment,
            method_commitment,
            consensus_proof,
            public_signals,
            scheme: scheme.to_string(),
            created_at,
        })
    }

    /// Generate a proof on the blocking pool.
    pub async fn generate(
        self: Arc<Self>,
        inputs: PrivateInputs,
        outputs: PublicOutputs,
    ) -> ProofResult<CommitmentProof> {
        let started = Instant::now();
        let proof = tokio::task::spawn_blocking(move || self.commit(&inputs, &outputs))
            .await
            .map_err(|e| ProofError::TaskFailed(e.to_string()))??;
        info!(
            proof_id = %proof.proof_id,
            asset = %proof.asset,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Proof generated"
        );
        Ok(proof)
    }

    /// Verify with this generator's own backend and verification key.
    pub fn verify(&self, proof: &CommitmentProof, public_signals: &PublicSignals) -> bool {
        proof::verify_with(
            self.backend.as_ref(),
            proof,
            public_signals,
            &self.verification_key(),
        )
    }
}
