//! SQLite implementation of the Database trait
//!
//! This module provides a SQLite-based implementation of the Database trait
//! using rusqlite and tokio-rusqlite for async operations. Timestamps are
//! stored as fixed-width RFC 3339 strings so that lexicographic comparison in
//! SQL matches chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::migrations::CREATE_SCHEMA;
use super::Database;
use crate::error::DbError;
use crate::models::{AlertDeliveryAudit, DeliveryRecord, Priority, SourceHealthRecord};

const HEALTH_COLUMNS: &str = r#"
    source_name, source_type, last_sync_attempt, last_successful_sync, sync_status,
    records_synced, records_failed, error_count, first_error_at, last_error,
    is_healthy, health_score, health_issues, latest_data_timestamp, data_lag_hours,
    last_sync_duration_seconds
"#;

const AUDIT_COLUMNS: &str = r#"
    alert_id, alert_type, title, priority, dedup_hash, success, delivery_attempts,
    delivery_total_delay_seconds, delivery_results, created_at
"#;

/// SQLite database implementation
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Create a new SQLite database connection
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;

        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    // =========================================================================
    // Source health operations
    // =========================================================================

    async fn upsert_health_record(&self, record: &SourceHealthRecord) -> Result<(), DbError> {
        let record = record.clone();
        let issues = serde_json::to_string(&record.health_issues)?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO source_health
                    (source_name, source_type, last_sync_attempt, last_successful_sync,
                     sync_status, records_synced, records_failed, error_count, first_error_at,
                     last_error, is_healthy, health_score, health_issues,
                     latest_data_timestamp, data_lag_hours, last_sync_duration_seconds)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                    "#,
                    rusqlite::params![
                        record.source_name,
                        record.source_type,
                        record.last_sync_attempt.map(format_datetime),
                        record.last_successful_sync.map(format_datetime),
                        record.sync_status.to_string(),
                        record.records_synced as i64,
                        record.records_failed as i64,
                        record.error_count as i64,
                        record.first_error_at.map(format_datetime),
                        record.last_error,
                        record.is_healthy,
                        record.health_score as i64,
                        issues,
                        record.latest_data_timestamp.map(format_datetime),
                        record.data_lag_hours,
                        record.last_sync_duration_seconds,
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn get_health_record(
        &self,
        source: &str,
    ) -> Result<Option<SourceHealthRecord>, DbError> {
        let source = source.to_string();

        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM source_health WHERE source_name = ?1",
                    HEALTH_COLUMNS
                );
                let record = conn
                    .query_row(&sql, [&source], health_from_row)
                    .optional()?;
                Ok(record)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_health_records(&self) -> Result<Vec<SourceHealthRecord>, DbError> {
        self.conn
            .call(|conn| {
                let sql = format!(
                    "SELECT {} FROM source_health ORDER BY source_name",
                    HEALTH_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let records = stmt
                    .query_map([], health_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(Into::into)
    }

    // =========================================================================
    // Alert delivery audit operations
    // =========================================================================

    async fn insert_delivery_audit(&self, audit: &AlertDeliveryAudit) -> Result<(), DbError> {
        let audit = audit.clone();
        let results = serde_json::to_string(&audit.delivery_results)?;

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO alert_delivery_audits
                    (alert_id, alert_type, title, priority, dedup_hash, success,
                     delivery_attempts, delivery_total_delay_seconds, delivery_results, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                    rusqlite::params![
                        audit.alert_id.to_string(),
                        audit.alert_type,
                        audit.title,
                        audit.priority.as_str(),
                        audit.dedup_hash,
                        audit.success,
                        audit.delivery_attempts as i64,
                        audit.delivery_total_delay_seconds,
                        results,
                        format_datetime(audit.created_at),
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn find_audits_by_hash(
        &self,
        dedup_hash: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AlertDeliveryAudit>, DbError> {
        let dedup_hash = dedup_hash.to_string();
        let since = format_datetime(since);

        self.conn
            .call(move |conn| {
                let sql = format!(
                    r#"
                    SELECT {} FROM alert_delivery_audits
                    WHERE dedup_hash = ?1 AND created_at >= ?2
                    ORDER BY created_at DESC
                    "#,
                    AUDIT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let audits = stmt
                    .query_map(rusqlite::params![dedup_hash, since], audit_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(audits)
            })
            .await
            .map_err(Into::into)
    }

    async fn list_recent_audits(&self, limit: u32) -> Result<Vec<AlertDeliveryAudit>, DbError> {
        self.conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM alert_delivery_audits ORDER BY created_at DESC LIMIT ?1",
                    AUDIT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let audits = stmt
                    .query_map([limit], audit_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(audits)
            })
            .await
            .map_err(Into::into)
    }
}

fn health_from_row(row: &Row<'_>) -> rusqlite::Result<SourceHealthRecord> {
    let issues: String = row.get(12)?;

    Ok(SourceHealthRecord {
        source_name: row.get(0)?,
        source_type: row.get(1)?,
        last_sync_attempt: parse_datetime(row.get(2)?),
        last_successful_sync: parse_datetime(row.get(3)?),
        sync_status: row
            .get::<_, String>(4)?
            .parse()
            .unwrap_or_default(),
        records_synced: row.get::<_, i64>(5)?.max(0) as u64,
        records_failed: row.get::<_, i64>(6)?.max(0) as u64,
        error_count: row.get::<_, i64>(7)?.max(0) as u32,
        first_error_at: parse_datetime(row.get(8)?),
        last_error: row.get(9)?,
        is_healthy: row.get(10)?,
        health_score: row.get::<_, i64>(11)?.clamp(0, 100) as u8,
        health_issues: serde_json::from_str(&issues)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?,
        latest_data_timestamp: parse_datetime(row.get(13)?),
        data_lag_hours: row.get(14)?,
        last_sync_duration_seconds: row.get(15)?,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AlertDeliveryAudit> {
    let alert_id: String = row.get(0)?;
    let priority: String = row.get(3)?;
    let results: String = row.get(8)?;
    let created_at: String = row.get(9)?;

    let delivery_results: Vec<DeliveryRecord> = serde_json::from_str(&results)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(AlertDeliveryAudit {
        alert_id: Uuid::parse_str(&alert_id)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        alert_type: row.get(1)?,
        title: row.get(2)?,
        priority: priority.parse().unwrap_or(Priority::Medium),
        dedup_hash: row.get(4)?,
        success: row.get(5)?,
        delivery_attempts: row.get::<_, i64>(6)?.max(0) as u32,
        delivery_total_delay_seconds: row.get(7)?,
        delivery_results,
        created_at: parse_datetime(Some(created_at)).unwrap_or_default(),
    })
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse datetime string to DateTime<Utc>
fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                // SQLite's CURRENT_TIMESTAMP format
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthConfig;
    use crate::models::{Alert, DispatchReport, SyncStatus};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn audit(hash: &str, success: bool, created_at: DateTime<Utc>) -> AlertDeliveryAudit {
        let alert = Alert::new("stale_data", "Stale", "orders is stale", Priority::High);
        let report = DispatchReport::from_records(vec![DeliveryRecord {
            channel: "webhook".to_string(),
            success,
            attempts: if success { 1 } else { 3 },
            total_delay_seconds: if success { 0.0 } else { 6.0 },
            errors: if success {
                Vec::new()
            } else {
                vec!["HTTP 503".to_string()]
            },
            final_error: if success {
                None
            } else {
                Some("HTTP 503".to_string())
            },
        }]);
        let mut audit = AlertDeliveryAudit::from_report(&alert, hash, report);
        audit.created_at = created_at;
        audit
    }

    // Test 1: Create in-memory database
    #[tokio::test]
    async fn test_create_in_memory_database() {
        let db = SqliteDatabase::in_memory().await;
        assert!(db.is_ok());
    }

    // Test 2: Upsert and retrieve a health record
    #[tokio::test]
    async fn test_upsert_and_get_health_record() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let health = HealthConfig::default();
        let now = Utc::now();

        let mut record = SourceHealthRecord::new("orders", "ecommerce");
        record.mark_started("ecommerce", now);
        record.apply_failure(now, "HTTP 503: unavailable", 2, &health);

        db.upsert_health_record(&record).await.unwrap();

        let loaded = db.get_health_record("orders").await.unwrap().unwrap();
        assert_eq!(loaded.source_type, "ecommerce");
        assert_eq!(loaded.sync_status, SyncStatus::Failed);
        assert_eq!(loaded.error_count, 1);
        assert_eq!(loaded.records_failed, 2);
        assert_eq!(loaded.last_error.as_deref(), Some("HTTP 503: unavailable"));
        assert_eq!(loaded.health_issues, record.health_issues);
        assert_eq!(
            loaded.first_error_at.map(|t| t.timestamp_micros()),
            Some(now.timestamp_micros())
        );
    }

    // Test 3: Upsert replaces the existing row
    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let health = HealthConfig::default();
        let now = Utc::now();

        let mut record = SourceHealthRecord::new("orders", "http");
        record.apply_failure(now, "timeout", 0, &health);
        db.upsert_health_record(&record).await.unwrap();

        record.apply_success(now, 10, Some(now), Duration::from_millis(1500), &health);
        db.upsert_health_record(&record).await.unwrap();

        let all = db.list_health_records().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sync_status, SyncStatus::Success);
        assert_eq!(all[0].error_count, 0);
        assert_eq!(all[0].records_synced, 10);
        assert_eq!(all[0].last_sync_duration_seconds, Some(1.5));
        assert!(all[0].health_issues.is_empty());
    }

    // Test 4: Missing health record returns None
    #[tokio::test]
    async fn test_get_missing_health_record() {
        let db = SqliteDatabase::in_memory().await.unwrap();

        assert!(db.get_health_record("unknown").await.unwrap().is_none());
    }

    // Test 5: Health records are listed by name
    #[tokio::test]
    async fn test_list_health_records_sorted() {
        let db = SqliteDatabase::in_memory().await.unwrap();

        for name in ["zeta", "alpha", "mid"] {
            db.upsert_health_record(&SourceHealthRecord::new(name, "http"))
                .await
                .unwrap();
        }

        let names: Vec<String> = db
            .list_health_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.source_name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    // Test 6: Audit round-trips through storage
    #[tokio::test]
    async fn test_insert_and_find_audit() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let now = Utc::now();
        let entry = audit("hash-a", false, now);

        db.insert_delivery_audit(&entry).await.unwrap();

        let found = db
            .find_audits_by_hash("hash-a", now - ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].alert_id, entry.alert_id);
        assert_eq!(found[0].priority, Priority::High);
        assert!(!found[0].success);
        assert_eq!(found[0].delivery_attempts, 3);
        assert_eq!(found[0].delivery_results, entry.delivery_results);
    }

    // Test 7: Audits outside the window or with another hash are ignored
    #[tokio::test]
    async fn test_find_audits_respects_window_and_hash() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let now = Utc::now();

        db.insert_delivery_audit(&audit("hash-a", true, now - ChronoDuration::hours(30)))
            .await
            .unwrap();
        db.insert_delivery_audit(&audit("hash-b", true, now))
            .await
            .unwrap();

        let found = db
            .find_audits_by_hash("hash-a", now - ChronoDuration::hours(24))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    // Test 8: Recent audits are newest first and limited
    #[tokio::test]
    async fn test_list_recent_audits() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let now = Utc::now();

        for minutes in [30, 10, 20] {
            db.insert_delivery_audit(&audit(
                &format!("h{}", minutes),
                true,
                now - ChronoDuration::minutes(minutes),
            ))
            .await
            .unwrap();
        }

        let recent = db.list_recent_audits(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].dedup_hash, "h10");
        assert_eq!(recent[1].dedup_hash, "h20");
    }

    // Test 9: Audit ids are unique
    #[tokio::test]
    async fn test_duplicate_audit_rejected() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let entry = audit("hash-a", true, Utc::now());

        db.insert_delivery_audit(&entry).await.unwrap();
        assert!(db.insert_delivery_audit(&entry).await.is_err());
    }

    // Test 10: Datetime parsing accepts both stored formats
    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime(Some("2024-03-01T10:00:00.000000Z".to_string())).is_some());
        assert!(parse_datetime(Some("2024-03-01 10:00:00".to_string())).is_some());
        assert!(parse_datetime(Some("yesterday".to_string())).is_none());
        assert!(parse_datetime(None).is_none());
    }
}
