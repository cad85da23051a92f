//! Integration tests for sentinel-engine.
//!
//! These tests drive the public interfaces end to end:
//! - Ingestion, consensus and source health
//! - Detection, scoring and alert delivery
//! - Proof generation and verification
//! - The feed poller against scripted fetchers

pub mod common;
