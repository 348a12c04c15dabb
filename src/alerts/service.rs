//! Alert sending with deduplication and audit

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::dedup::dedup_hash;
use super::dispatcher::AlertDispatcher;
use crate::database::Database;
use crate::error::DbError;
use crate::models::{Alert, AlertDeliveryAudit, Priority};

/// Result of [`AlertService::send_alert`]
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// The alert went through the dispatcher; `audit.success` tells if it arrived
    Sent {
        /// Audit entry appended for this send
        audit: AlertDeliveryAudit,
    },
    /// An equivalent alert was already delivered inside the dedup window
    Suppressed {
        /// Fingerprint shared with the earlier alert
        dedup_hash: String,
        /// Id of the alert that was delivered earlier
        previous_alert_id: Uuid,
    },
}

impl AlertOutcome {
    /// True if the alert was delivered by at least one channel just now
    pub fn delivered(&self) -> bool {
        matches!(self, AlertOutcome::Sent { audit } if audit.success)
    }

    /// True if the alert was suppressed as a duplicate
    pub fn is_suppressed(&self) -> bool {
        matches!(self, AlertOutcome::Suppressed { .. })
    }
}

/// Delivery metrics aggregated from recent audits
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Alerts delivered by at least one channel
    pub total_sent: u64,
    /// Alerts no channel accepted
    pub total_failed: u64,
    /// Attempts beyond the first on each channel
    pub total_retries: u64,
    /// Attempts across all channels
    pub total_attempts: u64,
    /// Percentage of alerts delivered, rounded to two decimals
    pub success_rate: f64,
}

impl DeliveryStats {
    /// Aggregate a set of audits
    pub fn from_audits(audits: &[AlertDeliveryAudit]) -> Self {
        let mut stats = DeliveryStats::default();
        for audit in audits {
            if audit.success {
                stats.total_sent += 1;
            } else {
                stats.total_failed += 1;
            }
            stats.total_retries += u64::from(audit.retries());
            stats.total_attempts += u64::from(audit.delivery_attempts);
        }

        let total = stats.total_sent + stats.total_failed;
        if total > 0 {
            let rate = stats.total_sent as f64 / total as f64 * 100.0;
            stats.success_rate = (rate * 100.0).round() / 100.0;
        }
        stats
    }
}

/// Front door for raising alerts
///
/// Fingerprints the alert, suppresses it when an equivalent one was
/// delivered inside the window, otherwise dispatches it and appends an
/// audit entry.
pub struct AlertService<D: Database> {
    db: Arc<D>,
    dispatcher: AlertDispatcher,
    dedup_window_hours: u32,
}

impl<D: Database> AlertService<D> {
    /// Create a new alert service
    pub fn new(db: Arc<D>, dispatcher: AlertDispatcher, dedup_window_hours: u32) -> Self {
        Self {
            db,
            dispatcher,
            dedup_window_hours,
        }
    }

    /// Dispatcher used for delivery
    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    /// Raise an alert
    ///
    /// Storage errors never block delivery: a failed dedup lookup sends the
    /// alert anyway and a failed audit write is logged.
    pub async fn send_alert(
        &self,
        alert_type: &str,
        title: &str,
        message: &str,
        data: serde_json::Map<String, serde_json::Value>,
        priority: Priority,
    ) -> AlertOutcome {
        let alert = Alert::new(alert_type, title, message, priority).with_data(data);
        self.send(alert).await
    }

    /// Raise a prebuilt alert
    pub async fn send(&self, alert: Alert) -> AlertOutcome {
        let hash = dedup_hash(&alert.alert_type, &alert.message, alert.created_at);
        let since = alert.created_at - ChronoDuration::hours(i64::from(self.dedup_window_hours));

        match self.db.find_audits_by_hash(&hash, since).await {
            Ok(previous) => {
                if let Some(earlier) = previous.iter().find(|a| a.success) {
                    info!(
                        alert_type = %alert.alert_type,
                        dedup_hash = %hash,
                        previous_alert_id = %earlier.alert_id,
                        "Duplicate alert suppressed"
                    );
                    return AlertOutcome::Suppressed {
                        dedup_hash: hash,
                        previous_alert_id: earlier.alert_id,
                    };
                }
            }
            Err(err) => {
                error!(
                    alert_type = %alert.alert_type,
                    error = %err,
                    "Dedup lookup failed, sending alert anyway"
                );
            }
        }

        let report = self.dispatcher.send(&alert).await;
        let audit = AlertDeliveryAudit::from_report(&alert, hash, report);

        if let Err(err) = self.db.insert_delivery_audit(&audit).await {
            error!(
                alert_id = %audit.alert_id,
                error = %err,
                "Failed to record alert delivery audit"
            );
        }

        AlertOutcome::Sent { audit }
    }

    /// Delivery metrics over the `limit` most recent audits
    pub async fn delivery_stats(&self, limit: u32) -> Result<DeliveryStats, DbError> {
        let audits = self.db.list_recent_audits(limit).await?;
        Ok(DeliveryStats::from_audits(&audits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::channels::MockAlertChannel;
    use crate::alerts::dispatcher::ChannelRoute;
    use crate::config::RetryConfig;
    use crate::database::{MockDatabase, SqliteDatabase};
    use crate::error::DeliveryError;
    use crate::models::DeliveryRecord;
    use serde_json::json;

    fn channel(name: &str, succeed: bool, times: usize) -> ChannelRoute {
        let mut mock = MockAlertChannel::new();
        mock.expect_name().return_const(name.to_string());
        mock.expect_send_once().times(times).returning(move |_| {
            if succeed {
                Ok(())
            } else {
                Err(DeliveryError::Http { status: 400 })
            }
        });
        ChannelRoute::new(Arc::new(mock), RetryConfig::immediate(3))
    }

    async fn service(routes: Vec<ChannelRoute>) -> AlertService<SqliteDatabase> {
        let db = Arc::new(SqliteDatabase::in_memory().await.unwrap());
        AlertService::new(db, AlertDispatcher::new(routes), 24)
    }

    fn data() -> serde_json::Map<String, serde_json::Value> {
        let mut data = serde_json::Map::new();
        data.insert("source".to_string(), json!("orders"));
        data
    }

    // Test 1: First alert is sent and audited
    #[tokio::test]
    async fn test_first_alert_sent() {
        let service = service(vec![channel("webhook", true, 1)]).await;

        let outcome = service
            .send_alert("stale_data", "Stale", "orders is 26 hours old", data(), Priority::High)
            .await;

        assert!(outcome.delivered());
        let AlertOutcome::Sent { audit } = outcome else {
            panic!("expected Sent");
        };
        assert_eq!(audit.delivery_attempts, 1);
        assert_eq!(audit.dedup_hash.len(), 32);

        let stored = service.db.list_recent_audits(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].alert_id, audit.alert_id);
    }

    // Test 2: Equivalent alert inside the window is suppressed
    #[tokio::test]
    async fn test_duplicate_suppressed() {
        let service = service(vec![channel("webhook", true, 1)]).await;

        let first = service
            .send_alert("stale_data", "Stale", "orders is 26 hours old", data(), Priority::High)
            .await;
        let second = service
            .send_alert("stale_data", "Stale", "Orders is 27 hours  old", data(), Priority::High)
            .await;

        let AlertOutcome::Sent { audit } = first else {
            panic!("expected Sent");
        };
        match second {
            AlertOutcome::Suppressed {
                dedup_hash,
                previous_alert_id,
            } => {
                assert_eq!(dedup_hash, audit.dedup_hash);
                assert_eq!(previous_alert_id, audit.alert_id);
            }
            other => panic!("expected Suppressed, got {:?}", other),
        }

        assert_eq!(service.db.list_recent_audits(10).await.unwrap().len(), 1);
    }

    // Test 3: A failed delivery does not suppress the next attempt
    #[tokio::test]
    async fn test_failed_delivery_not_suppressing() {
        let service = service(vec![channel("webhook", false, 2)]).await;

        let first = service
            .send_alert("source_unhealthy", "Down", "orders down", data(), Priority::Critical)
            .await;
        let second = service
            .send_alert("source_unhealthy", "Down", "orders down", data(), Priority::Critical)
            .await;

        assert!(!first.delivered());
        assert!(!second.is_suppressed());
        assert_eq!(service.db.list_recent_audits(10).await.unwrap().len(), 2);
    }

    // Test 4: Different content is not deduplicated
    #[tokio::test]
    async fn test_different_alerts_both_sent() {
        let service = service(vec![channel("webhook", true, 2)]).await;

        let a = service
            .send_alert("stale_data", "Stale", "orders is stale", data(), Priority::High)
            .await;
        let b = service
            .send_alert("stale_data", "Stale", "invoices is stale", data(), Priority::High)
            .await;

        assert!(a.delivered());
        assert!(b.delivered());
    }

    // Test 5: Lookup failure still sends
    #[tokio::test]
    async fn test_lookup_failure_sends_anyway() {
        let mut db = MockDatabase::new();
        db.expect_find_audits_by_hash()
            .returning(|_, _| Err(DbError::NotFound));
        db.expect_insert_delivery_audit()
            .times(1)
            .returning(|_| Ok(()));

        let service = AlertService::new(
            Arc::new(db),
            AlertDispatcher::new(vec![channel("webhook", true, 1)]),
            24,
        );

        let outcome = service
            .send_alert("t", "title", "msg", serde_json::Map::new(), Priority::Low)
            .await;
        assert!(outcome.delivered());
    }

    // Test 6: Audit write failure is not fatal
    #[tokio::test]
    async fn test_audit_failure_logged() {
        let mut db = MockDatabase::new();
        db.expect_find_audits_by_hash().returning(|_, _| Ok(vec![]));
        db.expect_insert_delivery_audit()
            .returning(|_| Err(DbError::Serialization("disk full".to_string())));

        let service = AlertService::new(
            Arc::new(db),
            AlertDispatcher::new(vec![channel("webhook", true, 1)]),
            24,
        );

        let outcome = service
            .send_alert("t", "title", "msg", serde_json::Map::new(), Priority::Low)
            .await;
        assert!(outcome.delivered());
    }

    // Test 7: Stats aggregate recent audits
    #[tokio::test]
    async fn test_delivery_stats() {
        let service = service(vec![channel("webhook", true, 3)]).await;

        for msg in ["a failed", "b failed", "c failed"] {
            service
                .send_alert("t", "title", msg, serde_json::Map::new(), Priority::Low)
                .await;
        }

        let stats = service.delivery_stats(100).await.unwrap();
        assert_eq!(stats.total_sent, 3);
        assert_eq!(stats.total_failed, 0);
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.total_retries, 0);
        assert!((stats.success_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_stats_from_audits() {
        let alert = Alert::new("t", "title", "msg", Priority::Low);
        let record = |success: bool, attempts: u32| DeliveryRecord {
            channel: "webhook".to_string(),
            success,
            attempts,
            total_delay_seconds: 0.0,
            errors: vec![],
            final_error: None,
        };
        let ok = AlertDeliveryAudit::from_report(
            &alert,
            "h",
            crate::models::DispatchReport::from_records(vec![record(true, 2)]),
        );
        let failed = AlertDeliveryAudit::from_report(
            &alert,
            "h",
            crate::models::DispatchReport::from_records(vec![record(false, 3), record(false, 1)]),
        );

        let stats = DeliveryStats::from_audits(&[ok, failed.clone(), failed]);
        assert_eq!(stats.total_sent, 1);
        assert_eq!(stats.total_failed, 2);
        assert_eq!(stats.total_attempts, 2 + 4 + 4);
        assert_eq!(stats.total_retries, 1 + 2 + 2);
        assert!((stats.success_rate - 33.33).abs() < 1e-9);
    }

    #[test]
    fn test_stats_empty() {
        assert_eq!(DeliveryStats::from_audits(&[]), DeliveryStats::default());
    }
}
