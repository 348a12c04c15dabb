//! Built-in scheduler jobs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::alerts::AlertService;
use crate::config::RetryConfig;
use crate::database::Database;
use crate::error::{DbError, SyncError};
use crate::health::SourceHealthTracker;
use crate::models::{Priority, SourceHealthRecord};
use crate::sync::connector::Connector;
use crate::sync::orchestrator::{SyncOrchestrator, SyncOutcome};
use crate::sync::retry::RetryExecutor;
use crate::sync::scheduler::{JobHandler, JobReport};

/// Alert type raised when a failure leaves a source unhealthy
pub const ALERT_SOURCE_UNHEALTHY: &str = "source_unhealthy";
/// Alert type raised for stale sources
pub const ALERT_STALE_DATA: &str = "stale_data";

fn store_error(err: DbError) -> SyncError {
    SyncError::Other(format!("health store: {}", err))
}

/// Runs one connector over a trailing window
pub struct SyncJob<D: Database> {
    orchestrator: Arc<SyncOrchestrator<D>>,
    connector: Arc<dyn Connector>,
    lookback: ChronoDuration,
    retry: Option<RetryExecutor>,
    alerts: Option<Arc<AlertService<D>>>,
}

impl<D: Database> SyncJob<D> {
    /// Create a job syncing the last `lookback_hours` hours on each run
    pub fn new(
        orchestrator: Arc<SyncOrchestrator<D>>,
        connector: Arc<dyn Connector>,
        lookback_hours: u32,
    ) -> Self {
        Self {
            orchestrator,
            connector,
            lookback: ChronoDuration::hours(i64::from(lookback_hours)),
            retry: None,
            alerts: None,
        }
    }

    /// Use a source-specific retry policy instead of the orchestrator's
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(RetryExecutor::new(retry));
        self
    }

    /// Raise `source_unhealthy` alerts through this service
    pub fn with_alerts(mut self, alerts: Arc<AlertService<D>>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    async fn alert_if_unhealthy(&self, source: &str) {
        let Some(alerts) = &self.alerts else {
            return;
        };

        let record = match self.orchestrator.tracker().get_health(source).await {
            Ok(Some(record)) if !record.is_healthy => record,
            Ok(_) => return,
            Err(err) => {
                warn!(source = %source, error = %err, "Could not read health after failure");
                return;
            }
        };

        let mut data = serde_json::Map::new();
        data.insert("source".to_string(), json!(source));
        data.insert("error_count".to_string(), json!(record.error_count));
        data.insert("health_score".to_string(), json!(record.health_score));
        if let Some(first) = record.first_error_at {
            data.insert("failing_since".to_string(), json!(first.to_rfc3339()));
        }
        if let Some(last_error) = &record.last_error {
            data.insert("last_error".to_string(), json!(last_error));
        }

        alerts
            .send_alert(
                ALERT_SOURCE_UNHEALTHY,
                &format!("Source unhealthy: {}", source),
                &format!(
                    "{} has failed {} consecutive syncs",
                    source, record.error_count
                ),
                data,
                Priority::Critical,
            )
            .await;
    }
}

#[async_trait]
impl<D: Database + 'static> JobHandler for SyncJob<D> {
    async fn run(&self) -> Result<JobReport, SyncError> {
        let end = Utc::now();
        let start = end - self.lookback;

        let outcome = match &self.retry {
            Some(retry) => {
                self.orchestrator
                    .run_with(self.connector.as_ref(), start, end, retry)
                    .await
            }
            None => {
                self.orchestrator
                    .run(self.connector.as_ref(), start, end)
                    .await
            }
        };

        match outcome {
            SyncOutcome::Success { data, stats, .. } => Ok(JobReport {
                records: data.records,
                alerts_raised: 0,
                detail: Some(format!("{} attempt(s)", stats.attempts)),
            }),
            SyncOutcome::Failure { source, error, .. } => {
                self.alert_if_unhealthy(&source).await;
                Err(error)
            }
        }
    }
}

/// Checks configured sources for stale data
pub struct StalenessJob<D: Database> {
    tracker: Arc<SourceHealthTracker<D>>,
    alerts: Arc<AlertService<D>>,
    sources: Vec<(String, f64)>,
}

impl<D: Database> StalenessJob<D> {
    /// Create a job checking `(source, max_age_hours)` pairs
    pub fn new(
        tracker: Arc<SourceHealthTracker<D>>,
        alerts: Arc<AlertService<D>>,
        sources: Vec<(String, f64)>,
    ) -> Self {
        Self {
            tracker,
            alerts,
            sources,
        }
    }
}

fn stale_message(source: &str, record: Option<&SourceHealthRecord>, max_age_hours: f64) -> String {
    match record.and_then(|r| r.last_successful_sync) {
        Some(last) => {
            let hours = (Utc::now() - last).num_seconds() as f64 / 3600.0;
            format!(
                "Data from {} is {:.1} hours old (limit {} hours)",
                source, hours, max_age_hours
            )
        }
        None => format!("No successful sync recorded for {}", source),
    }
}

#[async_trait]
impl<D: Database + 'static> JobHandler for StalenessJob<D> {
    async fn run(&self) -> Result<JobReport, SyncError> {
        let mut alerts_raised = 0;

        for (source, max_age_hours) in &self.sources {
            let stale = self
                .tracker
                .check_staleness(source, *max_age_hours)
                .await
                .map_err(store_error)?;
            if !stale {
                continue;
            }

            let record = self.tracker.get_health(source).await.map_err(store_error)?;

            let mut data = serde_json::Map::new();
            data.insert("source".to_string(), json!(source));
            data.insert("max_age_hours".to_string(), json!(max_age_hours));
            if let Some(last) = record.as_ref().and_then(|r| r.last_successful_sync) {
                data.insert("last_successful_sync".to_string(), json!(last.to_rfc3339()));
            }

            self.alerts
                .send_alert(
                    ALERT_STALE_DATA,
                    &format!("Stale data: {}", source),
                    &stale_message(source, record.as_ref(), *max_age_hours),
                    data,
                    Priority::High,
                )
                .await;
            alerts_raised += 1;
        }

        info!(
            checked = self.sources.len(),
            stale = alerts_raised,
            "Staleness check finished"
        );

        Ok(JobReport {
            records: self.sources.len() as u64,
            alerts_raised,
            detail: None,
        })
    }
}
