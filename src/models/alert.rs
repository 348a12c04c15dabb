//! Alert and delivery domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Urgency of an alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority
    Low,
    /// Medium priority
    #[default]
    Medium,
    /// High priority
    High,
    /// Critical priority
    Critical,
}

impl Priority {
    /// Lowercase name used in storage and payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Hex color used by chat attachments and email headers
    pub fn color(&self) -> &'static str {
        match self {
            Priority::Critical => "#dc3545",
            Priority::High => "#fd7e14",
            Priority::Medium => "#ffc107",
            Priority::Low => "#28a745",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// A notification to deliver to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id
    pub id: Uuid,
    /// Machine-readable category (e.g. `source_unhealthy`)
    pub alert_type: String,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Structured context, rendered as fields or a table
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Urgency
    pub priority: Priority,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Create an alert with a fresh id and no data
    pub fn new(
        alert_type: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type: alert_type.into(),
            title: title.into(),
            message: message.into(),
            data: serde_json::Map::new(),
            priority,
            created_at: Utc::now(),
        }
    }

    /// Attach structured context
    pub fn with_data(mut self, data: serde_json::Map<String, serde_json::Value>) -> Self {
        self.data = data;
        self
    }
}

/// Outcome of delivering one alert through one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// Channel name
    pub channel: String,
    /// Whether the channel eventually accepted the alert
    pub success: bool,
    /// Attempts made on this channel
    pub attempts: u32,
    /// Backoff time spent on this channel in seconds
    pub total_delay_seconds: f64,
    /// First error messages (at most five)
    pub errors: Vec<String>,
    /// Error that ended delivery on this channel
    pub final_error: Option<String>,
}

/// Outcome of delivering one alert through every configured channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// True if at least one channel succeeded
    pub success: bool,
    /// One record per channel, in route order
    pub results: Vec<DeliveryRecord>,
    /// Attempts summed across channels
    pub total_attempts: u32,
    /// Backoff time summed across channels in seconds
    pub total_delay_seconds: f64,
}

impl DispatchReport {
    /// Build a report from per-channel records
    pub fn from_records(results: Vec<DeliveryRecord>) -> Self {
        Self {
            success: results.iter().any(|r| r.success),
            total_attempts: results.iter().map(|r| r.attempts).sum(),
            total_delay_seconds: results.iter().map(|r| r.total_delay_seconds).sum(),
            results,
        }
    }

    /// Names of channels that did not accept the alert
    pub fn failed_channels(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.channel.as_str())
            .collect()
    }
}

/// Append-only audit entry for one alert send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDeliveryAudit {
    /// Id of the alert that was sent
    pub alert_id: Uuid,
    /// Alert category
    pub alert_type: String,
    /// Alert headline
    pub title: String,
    /// Alert urgency
    pub priority: Priority,
    /// Content fingerprint used for deduplication
    pub dedup_hash: String,
    /// True if at least one channel succeeded
    pub success: bool,
    /// Attempts summed across channels
    pub delivery_attempts: u32,
    /// Backoff time summed across channels in seconds
    pub delivery_total_delay_seconds: f64,
    /// Per-channel outcomes
    pub delivery_results: Vec<DeliveryRecord>,
    /// When the send finished
    pub created_at: DateTime<Utc>,
}

impl AlertDeliveryAudit {
    /// Build the audit entry for an alert and its dispatch report
    pub fn from_report(alert: &Alert, dedup_hash: impl Into<String>, report: DispatchReport) -> Self {
        Self {
            alert_id: alert.id,
            alert_type: alert.alert_type.clone(),
            title: alert.title.clone(),
            priority: alert.priority,
            dedup_hash: dedup_hash.into(),
            success: report.success,
            delivery_attempts: report.total_attempts,
            delivery_total_delay_seconds: report.total_delay_seconds,
            delivery_results: report.results,
            created_at: Utc::now(),
        }
    }

    /// Retries performed beyond the first attempt of each channel
    pub fn retries(&self) -> u32 {
        self.delivery_results
            .iter()
            .map(|r| r.attempts.saturating_sub(1))
            .sum()
    }
}
