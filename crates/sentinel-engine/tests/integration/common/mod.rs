//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod scripted_fetcher;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use sentinel_core::AssetId;
use sentinel_engine::{EngineConfig, OracleGuard};

pub const T0_MS: i64 = 1_700_000_000_000;

/// `T0 + ms`.
pub fn t(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(T0_MS).unwrap() + Duration::milliseconds(ms)
}

pub fn asset(id: &str) -> AssetId {
    AssetId::new(id).unwrap()
}

pub fn guard() -> OracleGuard {
    OracleGuard::new(EngineConfig::default()).unwrap()
}

pub fn submit(guard: &OracleGuard, asset: &str, source: &str, price: Decimal, ms: i64) {
    guard
        .submit_observation(asset, source, price, t(ms), None, Decimal::ONE)
        .unwrap();
}

pub fn submit_in_block(
    guard: &OracleGuard,
    asset: &str,
    source: &str,
    price: Decimal,
    ms: i64,
    block: u64,
) {
    guard
        .submit_observation(asset, source, price, t(ms), Some(block), Decimal::ONE)
        .unwrap();
}

/// One source spikes 20% and reverts within the same block.
pub fn submit_flash_loan_window(guard: &OracleGuard, asset: &str) {
    submit_in_block(guard, asset, "band", Decimal::new(100, 2), 0, 100);
    submit_in_block(guard, asset, "chainlink", Decimal::new(120, 2), 6_000, 101);
    submit_in_block(guard, asset, "chainlink", Decimal::new(100, 2), 6_150, 101);
}
