//! Pure aggregation math over source prices.
//!
//! Shared by the consensus calculator (which aggregates live observations)
//! and the proof generator (which re-derives the aggregate from private
//! inputs before attesting to it). Everything here is deterministic.

use crate::error::{CoreError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation method for a consensus price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusMethod {
    /// Middle value; mean of the two central values for even counts.
    #[default]
    Median,
    /// Σ(price·confidence) / Σ(confidence).
    WeightedAverage,
    /// Mean after dropping `trim_fraction` of values from each end.
    TrimmedMean,
}

impl ConsensusMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::WeightedAverage => "weighted_average",
            Self::TrimmedMean => "trimmed_mean",
        }
    }
}

impl fmt::Display for ConsensusMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn sorted(prices: &[Decimal]) -> Vec<Decimal> {
    let mut v = prices.to_vec();
    v.sort();
    v
}

fn overflow(op: &str) -> CoreError {
    CoreError::Overflow(format!("{op} out of decimal range"))
}

fn checked_sum(values: impl IntoIterator<Item = Decimal>, op: &str) -> Result<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(|| overflow(op))
}

/// Median of `prices`; mean of the two central values for even counts.
pub fn median(prices: &[Decimal]) -> Result<Decimal> {
    if prices.is_empty() {
        return Err(CoreError::Aggregation("median of no prices".to_string()));
    }
    let v = sorted(prices);
    let mid = v.len() / 2;
    if v.len() % 2 == 1 {
        return Ok(v[mid]);
    }
    v[mid - 1]
        .checked_add(v[mid])
        .and_then(|sum| sum.checked_div(Decimal::TWO))
        .ok_or_else(|| overflow("median"))
}

/// Weighted average. Errors when empty, lengths differ, or total weight is zero.
pub fn weighted_average(prices: &[Decimal], weights: &[Decimal]) -> Result<Decimal> {
    if prices.is_empty() || prices.len() != weights.len() {
        return Err(CoreError::Aggregation(format!(
            "weighted average of {} prices / {} weights",
            prices.len(),
            weights.len()
        )));
    }
    let total_weight = checked_sum(weights.iter().copied(), "total weight")?;
    if total_weight.is_zero() {
        return Err(CoreError::Aggregation("total weight is zero".to_string()));
    }
    let products = prices
        .iter()
        .zip(weights)
        .map(|(p, w)| p.checked_mul(*w))
        .collect::<Option<Vec<Decimal>>>()
        .ok_or_else(|| overflow("weighted price"))?;
    checked_sum(products, "weighted sum")?
        .checked_div(total_weight)
        .ok_or_else(|| overflow("weighted average"))
}

/// Mean after dropping `floor(n * trim_fraction)` values from each end.
///
/// Errors when empty or when trimming would leave nothing.
pub fn trimmed_mean(prices: &[Decimal], trim_fraction: Decimal) -> Result<Decimal> {
    let undefined = || {
        CoreError::Aggregation(format!(
            "trimmed mean of {} prices at trim {trim_fraction}",
            prices.len()
        ))
    };
    if prices.is_empty() || trim_fraction.is_sign_negative() {
        return Err(undefined());
    }
    let v = sorted(prices);
    let n = v.len();
    let k = Decimal::from(n as u64)
        .checked_mul(trim_fraction)
        .and_then(|d| d.floor().to_usize())
        .ok_or_else(undefined)?;
    if n <= 2 * k {
        return Err(undefined());
    }
    let kept = &v[k..n - k];
    checked_sum(kept.iter().copied(), "trimmed sum")?
        .checked_div(Decimal::from(kept.len() as u64))
        .ok_or_else(|| overflow("trimmed mean"))
}

/// Aggregate `prices` with `method`.
///
/// `weights` are only consulted for `WeightedAverage`; `trim_fraction` only
/// for `TrimmedMean`.
pub fn aggregate(
    method: ConsensusMethod,
    prices: &[Decimal],
    weights: &[Decimal],
    trim_fraction: Decimal,
) -> Result<Decimal> {
    match method {
        ConsensusMethod::Median => median(prices),
        ConsensusMethod::WeightedAverage => weighted_average(prices, weights),
        ConsensusMethod::TrimmedMean => trimmed_mean(prices, trim_fraction),
    }
}

/// Maximum pairwise relative deviation: `(max - min) / min`.
///
/// Zero for fewer than two prices or a non-positive minimum. Saturates at
/// `Decimal::MAX` when the ratio leaves the decimal range.
pub fn max_relative_spread(prices: &[Decimal]) -> Decimal {
    let (Some(min), Some(max)) = (prices.iter().min(), prices.iter().max()) else {
        return Decimal::ZERO;
    };
    if prices.len() < 2 || min.is_sign_negative() || min.is_zero() {
        return Decimal::ZERO;
    }
    max.checked_sub(*min)
        .and_then(|d| d.checked_div(*min))
        .unwrap_or(Decimal::MAX)
}
