//! syncwarden - resilient scheduled ingestion with deduplicated alerting
//!
//! This crate pulls data from flaky third-party APIs on a schedule, retries
//! transient failures with exponential backoff, tracks a health score per
//! source and alerts operators through webhook and email channels without
//! sending the same alert twice inside a window.

pub mod alerts;
pub mod config;
pub mod connectors;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod models;
pub mod sync;
