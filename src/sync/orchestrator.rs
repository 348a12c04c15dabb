//! Sequential sync orchestration
//!
//! Drives one connector through connect, validate and fetch, retrying each
//! step independently, and reports the outcome to the health tracker. `run`
//! never fails: every outcome is a [`SyncOutcome`] value.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::RetryConfig;
use crate::database::Database;
use crate::error::SyncError;
use crate::health::SourceHealthTracker;
use crate::sync::connector::{Connector, FetchedData};
use crate::sync::retry::{RetryExecutor, RetryStats};

/// Pipeline step at which a sync failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// `connect`
    Connect,
    /// `validate_connection`
    Validate,
    /// `fetch_data`
    Fetch,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStage::Connect => write!(f, "connect"),
            SyncStage::Validate => write!(f, "validate"),
            SyncStage::Fetch => write!(f, "fetch"),
        }
    }
}

/// Result of one orchestrated sync
///
/// `stats` belongs to the step that decided the outcome: the fetch on
/// success, the failing step otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// Data was fetched
    Success {
        /// Source key
        source: String,
        /// Fetched payload
        data: FetchedData,
        /// Wall-clock time of the whole pipeline
        duration: Duration,
        /// Retry stats of the fetch step
        stats: RetryStats,
    },
    /// A step failed permanently or ran out of attempts
    Failure {
        /// Source key
        source: String,
        /// Step that failed
        stage: SyncStage,
        /// Last error of that step
        error: SyncError,
        /// Wall-clock time of the whole pipeline
        duration: Duration,
        /// Retry stats of the failing step
        stats: RetryStats,
    },
}

impl SyncOutcome {
    /// True for `Success`
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Success { .. })
    }

    /// Source key
    pub fn source(&self) -> &str {
        match self {
            SyncOutcome::Success { source, .. } | SyncOutcome::Failure { source, .. } => source,
        }
    }

    /// Retry stats of the deciding step
    pub fn stats(&self) -> &RetryStats {
        match self {
            SyncOutcome::Success { stats, .. } | SyncOutcome::Failure { stats, .. } => stats,
        }
    }

    /// Wall-clock duration
    pub fn duration(&self) -> Duration {
        match self {
            SyncOutcome::Success { duration, .. } | SyncOutcome::Failure { duration, .. } => {
                *duration
            }
        }
    }

    /// Error of a failed sync
    pub fn error(&self) -> Option<&SyncError> {
        match self {
            SyncOutcome::Success { .. } => None,
            SyncOutcome::Failure { error, .. } => Some(error),
        }
    }
}

/// Runs connectors with retry and health bookkeeping
pub struct SyncOrchestrator<D: Database> {
    tracker: Arc<SourceHealthTracker<D>>,
    retry: RetryExecutor,
}

impl<D: Database> SyncOrchestrator<D> {
    /// Create an orchestrator using `retry` for every step
    pub fn new(tracker: Arc<SourceHealthTracker<D>>, retry: RetryConfig) -> Self {
        Self {
            tracker,
            retry: RetryExecutor::new(retry),
        }
    }

    /// Health tracker used for bookkeeping
    pub fn tracker(&self) -> &Arc<SourceHealthTracker<D>> {
        &self.tracker
    }

    /// Run one sync with the default retry policy
    pub async fn run(
        &self,
        connector: &dyn Connector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SyncOutcome {
        self.run_with(connector, start, end, &self.retry).await
    }

    /// Run one sync with an explicit retry policy
    pub async fn run_with(
        &self,
        connector: &dyn Connector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        retry: &RetryExecutor,
    ) -> SyncOutcome {
        let source = connector.source_name().to_string();
        let started = Instant::now();

        info!(
            source = %source,
            source_type = %connector.source_type(),
            start = %start,
            end = %end,
            "Starting sync"
        );

        if let Err(err) = self
            .tracker
            .start_sync(&source, connector.source_type())
            .await
        {
            error!(source = %source, error = %err, "Failed to record sync start");
        }

        let (connected, stats) = retry
            .execute(|| async move {
                match connector.connect().await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(SyncError::ConnectionRejected),
                    Err(err) => Err(err),
                }
            })
            .await;
        if let Err(err) = connected {
            return self
                .fail(source, SyncStage::Connect, err, started, stats)
                .await;
        }

        let (validated, stats) = retry
            .execute(|| async move {
                match connector.validate_connection().await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(SyncError::ValidationRejected),
                    Err(err) => Err(err),
                }
            })
            .await;
        if let Err(err) = validated {
            return self
                .fail(source, SyncStage::Validate, err, started, stats)
                .await;
        }

        let (fetched, stats) = retry
            .execute(|| connector.fetch_data(start, end))
            .await;
        let data = match fetched {
            Ok(data) => data,
            Err(err) => {
                return self
                    .fail(source, SyncStage::Fetch, err, started, stats)
                    .await
            }
        };

        let duration = started.elapsed();
        if let Err(err) = self
            .tracker
            .record_success(
                &source,
                data.records,
                data.latest_data_timestamp,
                duration,
            )
            .await
        {
            error!(source = %source, error = %err, "Failed to record sync success");
        }

        SyncOutcome::Success {
            source,
            data,
            duration,
            stats,
        }
    }

    async fn fail(
        &self,
        source: String,
        stage: SyncStage,
        error: SyncError,
        started: Instant,
        stats: RetryStats,
    ) -> SyncOutcome {
        let duration = started.elapsed();
        let message = format!("{} failed: {}", stage, error);

        if let Err(err) = self.tracker.record_failure(&source, &message, 0).await {
            error!(source = %source, error = %err, "Failed to record sync failure");
        }

        error!(
            source = %source,
            stage = %stage,
            attempts = stats.attempts,
            error = %error,
            "Sync failed"
        );

        SyncOutcome::Failure {
            source,
            stage,
            error,
            duration,
            stats,
        }
    }
}
