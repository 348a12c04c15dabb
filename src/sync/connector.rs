//! Connector capability set consumed by the orchestrator

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncError;

/// Data returned by one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedData {
    /// Raw payload as returned by the source
    pub payload: serde_json::Value,
    /// Number of records in the payload
    pub records: u64,
    /// Newest record timestamp, when the source exposes one
    pub latest_data_timestamp: Option<DateTime<Utc>>,
}

impl FetchedData {
    /// Wrap a payload with its record count
    pub fn new(payload: serde_json::Value, records: u64) -> Self {
        Self {
            payload,
            records,
            latest_data_timestamp: None,
        }
    }

    /// Attach the newest record timestamp
    pub fn with_latest_timestamp(mut self, latest: Option<DateTime<Utc>>) -> Self {
        self.latest_data_timestamp = latest;
        self
    }
}

/// Adapter for one external data source
///
/// `connect` and `validate_connection` return `Ok(false)` when the source
/// answered but refused; that is treated as a permanent failure. Transport
/// problems are reported as `Err` and classified for retry.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique source key
    fn source_name(&self) -> &str;

    /// Free-form type label
    fn source_type(&self) -> &str;

    /// Establish whatever session the source needs
    async fn connect(&self) -> Result<bool, SyncError>;

    /// Check that the session can actually read data
    async fn validate_connection(&self) -> Result<bool, SyncError>;

    /// Fetch records in the half-open window `[start, end)`
    async fn fetch_data(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedData, SyncError>;
}
