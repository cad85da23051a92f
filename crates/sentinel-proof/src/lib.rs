//! Commitments and proofs over consensus prices.
//!
//! A `CommitmentProof` binds a published aggregate to salted commitments of
//! the private inputs (prices, weights) and the aggregation method. Third
//! parties verify it from the public signals and a verification key; auditors
//! holding the private inputs can `open` it.

pub mod backend;
pub mod commitment;
pub mod error;
pub mod generator;
pub mod keys;
pub mod proof;

pub use backend::{
    AttestationBackend, AttestationVerifier, ProofBackend, ProofVerifier, VerificationKey,
    VerifierRegistry, ATTESTATION_SCHEME,
};
pub use commitment::{
    commit_method, commit_prices, DeviationBounds, Digest, PriceBound, PrivateInputs,
    PublicOutputs, PublicSignals, Salt,
};
pub use error::{ProofError, ProofResult};
pub use generator::{ProofConfig, ProofGenerator};
pub use keys::{load_signer, KeyError, KeySource};
pub use proof::{open, verify, verify_in, verify_with, CommitmentProof};
