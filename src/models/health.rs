//! Source health domain model
//!
//! A [`SourceHealthRecord`] is the persisted state of one data source. The
//! transition methods on it are pure: they take the current time explicitly so
//! the tracker can drive them and tests can pin the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::HealthConfig;

/// Maximum number of characters kept from a failure message
pub const MAX_ERROR_LENGTH: usize = 500;

/// Number of characters of the last error repeated in `health_issues`
pub const ISSUE_ERROR_EXCERPT: usize = 100;

/// Lifecycle state of the most recent sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Never synced
    #[default]
    Idle,
    /// A sync is running
    InProgress,
    /// The last sync succeeded
    Success,
    /// The last sync failed
    Failed,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "idle"),
            SyncStatus::InProgress => write!(f, "in_progress"),
            SyncStatus::Success => write!(f, "success"),
            SyncStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(SyncStatus::Idle),
            "in_progress" => Ok(SyncStatus::InProgress),
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            _ => Err(format!("Invalid sync status: {}", s)),
        }
    }
}

/// Persisted health state of a single data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealthRecord {
    /// Unique source key
    pub source_name: String,
    /// Free-form type label
    pub source_type: String,
    /// When the last sync started
    pub last_sync_attempt: Option<DateTime<Utc>>,
    /// When the last successful sync finished
    pub last_successful_sync: Option<DateTime<Utc>>,
    /// Current lifecycle state
    pub sync_status: SyncStatus,
    /// Records fetched by the last successful sync
    pub records_synced: u64,
    /// Records reported as failed by the last failed sync
    pub records_failed: u64,
    /// Consecutive failures since the last success
    pub error_count: u32,
    /// Start of the current failure streak
    pub first_error_at: Option<DateTime<Utc>>,
    /// Last failure message, truncated
    pub last_error: Option<String>,
    /// `health_score > 0`
    pub is_healthy: bool,
    /// Trust metric in 0..=100
    pub health_score: u8,
    /// Human-readable problems
    pub health_issues: Vec<String>,
    /// Newest data point seen by the last successful sync
    pub latest_data_timestamp: Option<DateTime<Utc>>,
    /// Age of `latest_data_timestamp` at the time of the last success
    pub data_lag_hours: Option<f64>,
    /// Wall-clock duration of the last successful sync
    pub last_sync_duration_seconds: Option<f64>,
}

impl SourceHealthRecord {
    /// Create an idle record for a source that has never synced
    pub fn new(source_name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            source_type: source_type.into(),
            last_sync_attempt: None,
            last_successful_sync: None,
            sync_status: SyncStatus::Idle,
            records_synced: 0,
            records_failed: 0,
            error_count: 0,
            first_error_at: None,
            last_error: None,
            is_healthy: true,
            health_score: 100,
            health_issues: Vec::new(),
            latest_data_timestamp: None,
            data_lag_hours: None,
            last_sync_duration_seconds: None,
        }
    }

    /// Enter `in_progress`
    pub fn mark_started(&mut self, source_type: &str, now: DateTime<Utc>) {
        self.source_type = source_type.to_string();
        self.sync_status = SyncStatus::InProgress;
        self.last_sync_attempt = Some(now);
    }

    /// Apply a successful sync, resetting the failure streak
    pub fn apply_success(
        &mut self,
        now: DateTime<Utc>,
        records_synced: u64,
        latest_data_timestamp: Option<DateTime<Utc>>,
        duration: Duration,
        health: &HealthConfig,
    ) {
        self.sync_status = SyncStatus::Success;
        self.last_successful_sync = Some(now);
        self.records_synced = records_synced;
        self.records_failed = 0;
        self.error_count = 0;
        self.first_error_at = None;
        self.last_error = None;
        self.health_score = health.healthy_score;
        self.is_healthy = true;
        self.health_issues.clear();
        self.last_sync_duration_seconds = Some(duration.as_secs_f64());

        if let Some(latest) = latest_data_timestamp {
            self.latest_data_timestamp = Some(latest);
        }
        self.data_lag_hours = self
            .latest_data_timestamp
            .map(|latest| hours_between(latest, now));
    }

    /// Apply a failed sync
    pub fn apply_failure(
        &mut self,
        now: DateTime<Utc>,
        error_message: &str,
        records_failed: u64,
        health: &HealthConfig,
    ) {
        self.sync_status = SyncStatus::Failed;
        self.error_count = self.error_count.saturating_add(1);
        self.records_failed = records_failed;
        if self.first_error_at.is_none() {
            self.first_error_at = Some(now);
        }

        let truncated = truncate_chars(error_message, MAX_ERROR_LENGTH);
        self.health_score = score_for(self.error_count, health);
        self.is_healthy = self.health_score > 0;
        self.health_issues = vec![
            format!("Consecutive failures: {}", self.error_count),
            format!(
                "Last error: {}",
                truncate_chars(&truncated, ISSUE_ERROR_EXCERPT)
            ),
        ];
        self.last_error = Some(truncated);
    }

    /// True if there is no successful sync or the last one is older than `max_age_hours`
    pub fn is_stale_at(&self, now: DateTime<Utc>, max_age_hours: f64) -> bool {
        match self.last_successful_sync {
            None => true,
            Some(last) => hours_between(last, now) > max_age_hours,
        }
    }
}

/// Map a consecutive-failure count to a health score
pub fn score_for(error_count: u32, health: &HealthConfig) -> u8 {
    if error_count >= health.unhealthy_after {
        health.unhealthy_score
    } else if error_count >= health.degraded_after {
        health.degraded_score
    } else {
        health.healthy_score
    }
}

fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 3_600_000.0
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
