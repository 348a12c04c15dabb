//! Per-source health tracker
//!
//! Loads a source's record, applies one state transition and writes it back.
//! The scheduler guarantees at most one in-flight sync per source, so the
//! load/modify/upsert sequence has a single writer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::database::Database;
use crate::error::DbError;
use crate::models::SourceHealthRecord;

const UNKNOWN_SOURCE_TYPE: &str = "unknown";

/// Records sync outcomes and derives a health score per source
pub struct SourceHealthTracker<D: Database> {
    db: Arc<D>,
    config: HealthConfig,
}

impl<D: Database> SourceHealthTracker<D> {
    /// Create a tracker backed by the given store
    pub fn new(db: Arc<D>, config: HealthConfig) -> Self {
        Self { db, config }
    }

    /// Thresholds in use
    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    async fn load_or_new(
        &self,
        source: &str,
        source_type: &str,
    ) -> Result<SourceHealthRecord, DbError> {
        Ok(self
            .db
            .get_health_record(source)
            .await?
            .unwrap_or_else(|| SourceHealthRecord::new(source, source_type)))
    }

    /// Mark a sync as started, creating the record on first use
    pub async fn start_sync(
        &self,
        source: &str,
        source_type: &str,
    ) -> Result<SourceHealthRecord, DbError> {
        let mut record = self.load_or_new(source, source_type).await?;
        record.mark_started(source_type, Utc::now());
        self.db.upsert_health_record(&record).await?;

        debug!(source = %source, source_type = %source_type, "Sync started");
        Ok(record)
    }

    /// Record a successful sync and reset the failure streak
    pub async fn record_success(
        &self,
        source: &str,
        records_synced: u64,
        latest_data_timestamp: Option<DateTime<Utc>>,
        duration: Duration,
    ) -> Result<SourceHealthRecord, DbError> {
        let mut record = self.load_or_new(source, UNKNOWN_SOURCE_TYPE).await?;
        let recovered_from = record.error_count;
        record.apply_success(
            Utc::now(),
            records_synced,
            latest_data_timestamp,
            duration,
            &self.config,
        );
        self.db.upsert_health_record(&record).await?;

        if recovered_from > 0 {
            info!(
                source = %source,
                previous_failures = recovered_from,
                "Source recovered"
            );
        }
        info!(
            source = %source,
            records = records_synced,
            duration_secs = duration.as_secs_f64(),
            data_lag_hours = ?record.data_lag_hours,
            "Sync succeeded"
        );
        Ok(record)
    }

    /// Record a failed sync
    pub async fn record_failure(
        &self,
        source: &str,
        error_message: &str,
        records_failed: u64,
    ) -> Result<SourceHealthRecord, DbError> {
        let mut record = self.load_or_new(source, UNKNOWN_SOURCE_TYPE).await?;
        record.apply_failure(Utc::now(), error_message, records_failed, &self.config);
        self.db.upsert_health_record(&record).await?;

        warn!(
            source = %source,
            error_count = record.error_count,
            health_score = record.health_score,
            is_healthy = record.is_healthy,
            error = %error_message,
            "Sync failed"
        );
        Ok(record)
    }

    /// True if the source never synced successfully or its last success is too old
    pub async fn check_staleness(&self, source: &str, max_age_hours: f64) -> Result<bool, DbError> {
        self.check_staleness_at(source, max_age_hours, Utc::now())
            .await
    }

    /// Staleness evaluated against an explicit clock
    pub async fn check_staleness_at(
        &self,
        source: &str,
        max_age_hours: f64,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let stale = match self.db.get_health_record(source).await? {
            Some(record) => record.is_stale_at(now, max_age_hours),
            None => true,
        };

        if stale {
            debug!(source = %source, max_age_hours = max_age_hours, "Source data is stale");
        }
        Ok(stale)
    }

    /// Snapshot of one source's record
    pub async fn get_health(&self, source: &str) -> Result<Option<SourceHealthRecord>, DbError> {
        self.db.get_health_record(source).await
    }

    /// Snapshot of every known source
    pub async fn all_health(&self) -> Result<Vec<SourceHealthRecord>, DbError> {
        self.db.list_health_records().await
    }
}
