//! Proof backends.
//!
//! A backend turns the digest of a proof statement into proof bytes and
//! checks them against a published verification key. The shipped backend is
//! a secp256k1 attestation: the attester signs the statement digest and
//! verifiers recover the signer address. It is an attestation by a known
//! key, not a zero-knowledge proof; a SNARK backend implements the same trait.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, PrimitiveSignature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::error::ProofResult;

/// Scheme identifier of the secp256k1 attestation backend.
pub const ATTESTATION_SCHEME: &str = "secp256k1-attestation/v1";

/// Public material needed to verify proofs of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationKey {
    pub scheme: String,
    pub attester: Address,
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.attester)
    }
}

/// Checks proof bytes of one scheme using only public material.
pub trait ProofVerifier: Send + Sync {
    fn scheme(&self) -> &'static str;

    fn verify(&self, statement_digest: &B256, proof: &[u8], key: &VerificationKey) -> bool;
}

/// Produces proofs that its own `ProofVerifier` half accepts.
pub trait ProofBackend: ProofVerifier {
    fn verification_key(&self) -> VerificationKey;

    /// Produce proof bytes over a statement digest.
    fn prove(&self, statement_digest: &B256) -> ProofResult<Vec<u8>>;
}

/// Verifier for the secp256k1 attestation scheme. Needs no key material.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttestationVerifier;

impl ProofVerifier for AttestationVerifier {
    fn scheme(&self) -> &'static str {
        ATTESTATION_SCHEME
    }

    fn verify(&self, statement_digest: &B256, proof: &[u8], key: &VerificationKey) -> bool {
        key.scheme == ATTESTATION_SCHEME
            && AttestationBackend::verify_signature(statement_digest, proof, &key.attester)
    }
}

/// ECDSA attestation over the statement digest.
pub struct AttestationBackend {
    signer: PrivateKeySigner,
}

impl AttestationBackend {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    pub fn attester(&self) -> Address {
        self.signer.address()
    }

    /// Check a 65-byte `r || s || v` signature against the attester address.
    pub fn verify_signature(statement_digest: &B256, proof: &[u8], attester: &Address) -> bool {
        let Ok(signature) = PrimitiveSignature::try_from(proof) else {
            return false;
        };
        signature
            .recover_address_from_prehash(statement_digest)
            .map(|recovered| recovered == *attester)
            .unwrap_or(false)
    }
}

impl ProofVerifier for AttestationBackend {
    fn scheme(&self) -> &'static str {
        ATTESTATION_SCHEME
    }

    fn verify(&self, statement_digest: &B256, proof: &[u8], key: &VerificationKey) -> bool {
        AttestationVerifier.verify(statement_digest, proof, key)
    }
}

impl ProofBackend for AttestationBackend {
    fn verification_key(&self) -> VerificationKey {
        VerificationKey {
            scheme: ATTESTATION_SCHEME.to_string(),
            attester: self.signer.address(),
        }
    }

    fn prove(&self, statement_digest: &B256) -> ProofResult<Vec<u8>> {
        // Do not log the signature.
        let signature = self.signer.sign_hash_sync(statement_digest)?;
        Ok(signature.as_bytes().to_vec())
    }
}

/// Verifiers by scheme, for checking proofs whose backend is not at hand.
///
/// The default registry knows the attestation scheme; other backends
/// `register` their verifier.
#[derive(Clone)]
pub struct VerifierRegistry {
    verifiers: HashMap<&'static str, Arc<dyn ProofVerifier>>,
}

impl VerifierRegistry {
    pub fn empty() -> Self {
        Self {
            verifiers: HashMap::new(),
        }
    }

    /// Add a verifier, replacing any earlier one for the same scheme.
    pub fn register(&mut self, verifier: Arc<dyn ProofVerifier>) {
        self.verifiers.insert(verifier.scheme(), verifier);
    }

    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn ProofVerifier>> {
        self.verifiers.get(scheme)
    }

    /// Check proof bytes with the verifier for the key's scheme.
    ///
    /// Unknown schemes never verify.
    pub fn verify(&self, key: &VerificationKey, statement_digest: &B256, proof: &[u8]) -> bool {
        self.get(&key.scheme)
            .is_some_and(|v| v.verify(statement_digest, proof, key))
    }
}

impl Default for VerifierRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AttestationVerifier));
        registry
    }
}
