//! Database migrations for syncwarden
//!
//! This module contains SQL migrations for the SQLite database schema.

/// SQL statement to create the initial database schema
pub const CREATE_SCHEMA: &str = r#"
-- One row per data source, upserted on every sync transition
CREATE TABLE IF NOT EXISTS source_health (
    source_name TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    last_sync_attempt TEXT,
    last_successful_sync TEXT,
    sync_status TEXT NOT NULL DEFAULT 'idle',
    records_synced INTEGER NOT NULL DEFAULT 0,
    records_failed INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    first_error_at TEXT,
    last_error TEXT,
    is_healthy INTEGER NOT NULL DEFAULT 1,
    health_score INTEGER NOT NULL DEFAULT 100,
    health_issues TEXT NOT NULL DEFAULT '[]',
    latest_data_timestamp TEXT,
    data_lag_hours REAL,
    last_sync_duration_seconds REAL
);

-- Append-only record of every alert send
CREATE TABLE IF NOT EXISTS alert_delivery_audits (
    alert_id TEXT PRIMARY KEY,
    alert_type TEXT NOT NULL,
    title TEXT NOT NULL,
    priority TEXT NOT NULL,
    dedup_hash TEXT NOT NULL,
    success INTEGER NOT NULL,
    delivery_attempts INTEGER NOT NULL,
    delivery_total_delay_seconds REAL NOT NULL,
    delivery_results TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audits_hash_time ON alert_delivery_audits(dedup_hash, created_at);
CREATE INDEX IF NOT EXISTS idx_audits_time ON alert_delivery_audits(created_at DESC);
"#;
