//! Database layer for syncwarden
//!
//! This module defines the database trait and SQLite implementation. The core
//! persists exactly two kinds of records: per-source health and alert
//! delivery audits.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteDatabase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbError;
use crate::models::{AlertDeliveryAudit, SourceHealthRecord};

/// Database trait for data persistence
///
/// It uses `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Database: Send + Sync {
    // =========================================================================
    // Source health operations
    // =========================================================================

    /// Insert or replace the health record keyed by its source name
    async fn upsert_health_record(&self, record: &SourceHealthRecord) -> Result<(), DbError>;

    /// Get the health record for a source
    async fn get_health_record(&self, source: &str)
        -> Result<Option<SourceHealthRecord>, DbError>;

    /// Get all health records ordered by source name
    async fn list_health_records(&self) -> Result<Vec<SourceHealthRecord>, DbError>;

    // =========================================================================
    // Alert delivery audit operations
    // =========================================================================

    /// Append a delivery audit
    async fn insert_delivery_audit(&self, audit: &AlertDeliveryAudit) -> Result<(), DbError>;

    /// Audits with the given dedup hash created at or after `since`, newest first
    async fn find_audits_by_hash(
        &self,
        dedup_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertDeliveryAudit>, DbError>;

    /// Most recent audits, newest first
    async fn list_recent_audits(&self, limit: u32) -> Result<Vec<AlertDeliveryAudit>, DbError>;
}
