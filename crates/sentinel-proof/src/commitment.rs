//! Commitment scheme over consensus inputs.
//!
//! - Price commitment: keccak256 Merkle root over salted leaves
//!   `keccak(LEAF || price || weight || salt)`, with leaves sorted before
//!   hashing so the root does not reveal which source reported what.
//! - Method commitment: `keccak(METHOD || msgpack(method, trim_fraction) || salt)`.
//!
//! Hiding comes from the 32-byte random salts; binding from keccak256
//! collision resistance. Domain tags keep leaves, inner nodes and method
//! commitments from ever colliding with each other.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{keccak256, B256};
use rand::RngCore;
use rust_decimal::{Decimal, RoundingStrategy};
use sentinel_core::{aggregate, AssetId, ConsensusMethod, CoreError, Price};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProofError, ProofResult};

const LEAF_DOMAIN: &[u8] = b"sentinel/price-leaf/v1";
const NODE_DOMAIN: &[u8] = b"sentinel/price-node/v1";
const METHOD_DOMAIN: &[u8] = b"sentinel/method/v1";

// =============================================================================
// Digest
// =============================================================================

/// 32-byte hash, serialized as `0x`-prefixed hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn as_b256(&self) -> B256 {
        B256::from(self.0)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<B256> for Digest {
    fn from(b: B256) -> Self {
        Self(b.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Serde helpers for byte vectors as `0x`-prefixed hex.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Private inputs
// =============================================================================

/// Random blinding value. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Salt([u8; 32]);

impl Salt {
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(..)")
    }
}

/// Everything the prover knows and the verifier must not need.
#[derive(Debug, Clone)]
pub struct PrivateInputs {
    pub prices: Vec<Decimal>,
    pub weights: Vec<Decimal>,
    /// One salt per price.
    pub salts: Vec<Salt>,
    pub method_salt: Salt,
}

impl PrivateInputs {
    /// Inputs with freshly generated salts.
    pub fn with_random_salts(prices: Vec<Decimal>, weights: Vec<Decimal>) -> Self {
        let salts = (0..prices.len()).map(|_| Salt::random()).collect();
        Self {
            prices,
            weights,
            salts,
            method_salt: Salt::random(),
        }
    }

    pub fn validate(&self) -> ProofResult<()> {
        if self.prices.is_empty() {
            return Err(ProofError::InvalidInputs("no prices".to_string()));
        }
        if self.weights.len() != self.prices.len() || self.salts.len() != self.prices.len() {
            return Err(ProofError::InvalidInputs(format!(
                "{} prices, {} weights, {} salts",
                self.prices.len(),
                self.weights.len(),
                self.salts.len()
            )));
        }
        if let Some(p) = self.prices.iter().find(|p| p.is_sign_negative() || p.is_zero()) {
            return Err(ProofError::InvalidInputs(format!("non-positive price {p}")));
        }
        if let Some(w) = self.weights.iter().find(|w| w.is_sign_negative() && !w.is_zero()) {
            return Err(ProofError::InvalidInputs(format!("negative weight {w}")));
        }
        Ok(())
    }
}

/// Claimed result of the aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicOutputs {
    pub asset: AssetId,
    pub aggregated_price: Price,
    pub method: ConsensusMethod,
    pub trim_fraction: Decimal,
}

impl PublicOutputs {
    /// Re-derive the aggregate from private inputs and compare with the claim.
    pub fn check_consistent(&self, inputs: &PrivateInputs) -> ProofResult<()> {
        let derived = aggregate(self.method, &inputs.prices, &inputs.weights, self.trim_fraction)?;
        if derived != self.aggregated_price.inner() {
            return Err(ProofError::InconsistentOutputs {
                claimed: self.aggregated_price.inner(),
                derived,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Public signals
// =============================================================================

/// Published range containing the aggregated price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBound {
    pub lower: Decimal,
    pub upper: Decimal,
}

/// Relative deviation of the contributing prices from the aggregate.
///
/// Lets third parties sanity-check plausibility without learning which
/// source reported which price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviationBounds {
    pub min: Decimal,
    pub max: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicSignals {
    pub aggregated_price_bound: PriceBound,
    pub source_count: usize,
    pub deviation_bounds: DeviationBounds,
}

impl PublicSignals {
    /// Derive the signals, rounding every bound outward to `decimals` places.
    ///
    /// Fails when a relative deviation leaves the decimal range.
    pub fn derive(
        inputs: &PrivateInputs,
        aggregated: Decimal,
        decimals: u32,
    ) -> ProofResult<Self> {
        let down = |d: Decimal| d.round_dp_with_strategy(decimals, RoundingStrategy::ToNegativeInfinity);
        let up = |d: Decimal| d.round_dp_with_strategy(decimals, RoundingStrategy::ToPositiveInfinity);

        let deviations: Vec<Decimal> = if aggregated.is_zero() {
            vec![Decimal::ZERO]
        } else {
            inputs
                .prices
                .iter()
                .map(|p| p.checked_sub(aggregated)?.checked_div(aggregated))
                .collect::<Option<Vec<Decimal>>>()
                .ok_or_else(|| {
                    ProofError::Core(CoreError::Overflow(format!(
                        "deviation from aggregate {aggregated}"
                    )))
                })?
        };
        let min = deviations.iter().copied().min().unwrap_or(Decimal::ZERO);
        let max = deviations.iter().copied().max().unwrap_or(Decimal::ZERO);

        Ok(Self {
            aggregated_price_bound: PriceBound {
                lower: down(aggregated),
                upper: up(aggregated),
            },
            source_count: inputs.prices.len(),
            deviation_bounds: DeviationBounds {
                min: down(min),
                max: up(max),
            },
        }
        .canonical())
    }

    /// Same values with trailing zeros stripped, so equal numbers encode equally.
    pub fn canonical(&self) -> Self {
        Self {
            aggregated_price_bound: PriceBound {
                lower: self.aggregated_price_bound.lower.normalize(),
                upper: self.aggregated_price_bound.upper.normalize(),
            },
            source_count: self.source_count,
            deviation_bounds: DeviationBounds {
                min: self.deviation_bounds.min.normalize(),
                max: self.deviation_bounds.max.normalize(),
            },
        }
    }

    /// Structural sanity checks a verifier applies before checking the proof.
    pub fn is_well_formed(&self) -> bool {
        let b = &self.aggregated_price_bound;
        let d = &self.deviation_bounds;
        self.source_count > 0
            && b.lower.is_sign_positive()
            && b.lower <= b.upper
            && d.min <= d.max
            && d.min <= Decimal::ZERO
            && d.max >= Decimal::ZERO
    }
}

// =============================================================================
// Commitments
// =============================================================================

fn leaf(price: Decimal, weight: Decimal, salt: &Salt) -> B256 {
    let price = price.normalize().to_string();
    let weight = weight.normalize().to_string();
    let mut data = Vec::with_capacity(LEAF_DOMAIN.len() + price.len() + weight.len() + 34);
    data.extend_from_slice(LEAF_DOMAIN);
    data.extend_from_slice(price.as_bytes());
    data.push(0x00);
    data.extend_from_slice(weight.as_bytes());
    data.push(0x00);
    data.extend_from_slice(salt.as_bytes());
    keccak256(&data)
}

/// Merkle root over already sorted leaves; an odd node is promoted unchanged.
fn merkle_root(mut level: Vec<B256>) -> B256 {
    if level.is_empty() {
        return keccak256(NODE_DOMAIN);
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut data = Vec::with_capacity(NODE_DOMAIN.len() + 64);
                    data.extend_from_slice(NODE_DOMAIN);
                    data.extend_from_slice(left.as_slice());
                    data.extend_from_slice(right.as_slice());
                    keccak256(&data)
                }
                _ => pair[0],
            })
            .collect();
    }
    level[0]
}

/// Commitment to the (price, weight) multiset.
pub fn commit_prices(inputs: &PrivateInputs) -> ProofResult<Digest> {
    inputs.validate()?;
    let mut leaves: Vec<B256> = inputs
        .prices
        .iter()
        .zip(&inputs.weights)
        .zip(&inputs.salts)
        .map(|((p, w), s)| leaf(*p, *w, s))
        .collect();
    leaves.sort();
    Ok(merkle_root(leaves).into())
}

#[derive(Serialize)]
struct MethodParams {
    method: ConsensusMethod,
    trim_fraction: String,
}

/// Commitment to the aggregation parameters.
pub fn commit_method(
    method: ConsensusMethod,
    trim_fraction: Decimal,
    salt: &Salt,
) -> ProofResult<Digest> {
    let params = MethodParams {
        method,
        trim_fraction: trim_fraction.normalize().to_string(),
    };
    let encoded =
        rmp_serde::to_vec_named(&params).map_err(|e| ProofError::Serialization(e.to_string()))?;
    let mut data = Vec::with_capacity(METHOD_DOMAIN.len() + encoded.len() + 32);
    data.extend_from_slice(METHOD_DOMAIN);
    data.extend_from_slice(&encoded);
    data.extend_from_slice(salt.as_bytes());
    Ok(keccak256(&data).into())
}
