//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use syncwarden::alerts::{AlertChannel, AlertDispatcher, AlertService, ChannelRoute};
use syncwarden::config::{HealthConfig, RetryConfig};
use syncwarden::database::SqliteDatabase;
use syncwarden::error::{DeliveryError, SyncError};
use syncwarden::health::SourceHealthTracker;
use syncwarden::models::Alert;
use syncwarden::sync::{Connector, FetchedData, SyncOrchestrator};

/// Create an in-memory database for testing
pub async fn create_test_database() -> Arc<SqliteDatabase> {
    Arc::new(
        SqliteDatabase::in_memory()
            .await
            .expect("Failed to create test database"),
    )
}

/// Create a tracker with default thresholds
pub fn create_test_tracker(db: Arc<SqliteDatabase>) -> Arc<SourceHealthTracker<SqliteDatabase>> {
    Arc::new(SourceHealthTracker::new(db, HealthConfig::default()))
}

/// Create an orchestrator that retries without sleeping
pub fn create_test_orchestrator(
    tracker: Arc<SourceHealthTracker<SqliteDatabase>>,
    max_attempts: u32,
) -> Arc<SyncOrchestrator<SqliteDatabase>> {
    Arc::new(SyncOrchestrator::new(
        tracker,
        RetryConfig::immediate(max_attempts),
    ))
}

/// Retry policy with real but tiny sleeps, for tests that talk to a mock server
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_secs: 0.01,
        max_delay_secs: 0.05,
        exponential_base: 2.0,
        jitter: false,
    }
}

/// Connector whose answers are scripted per step
///
/// Each step pops the next scripted result; the last one repeats.
pub struct ScriptedConnector {
    name: String,
    connect: Mutex<VecDeque<Result<bool, SyncError>>>,
    validate: Mutex<VecDeque<Result<bool, SyncError>>>,
    fetch: Mutex<VecDeque<Result<FetchedData, SyncError>>>,
    fetch_calls: Mutex<u32>,
}

fn next<T: Clone>(script: &Mutex<VecDeque<T>>) -> T {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front().unwrap()
    } else {
        script.front().cloned().expect("empty script")
    }
}

impl ScriptedConnector {
    /// Connector that connects, validates and returns `records` records
    pub fn healthy(name: &str, records: u64) -> Self {
        Self {
            name: name.to_string(),
            connect: Mutex::new(VecDeque::from([Ok(true)])),
            validate: Mutex::new(VecDeque::from([Ok(true)])),
            fetch: Mutex::new(VecDeque::from([Ok(FetchedData::new(
                serde_json::json!([]),
                records,
            ))])),
            fetch_calls: Mutex::new(0),
        }
    }

    /// Replace the fetch script
    pub fn with_fetch(self, script: Vec<Result<FetchedData, SyncError>>) -> Self {
        *self.fetch.lock().unwrap() = script.into();
        self
    }

    /// Replace the validate script
    pub fn with_validate(self, script: Vec<Result<bool, SyncError>>) -> Self {
        *self.validate.lock().unwrap() = script.into();
        self
    }

    /// Number of fetch calls made so far
    pub fn fetch_calls(&self) -> u32 {
        *self.fetch_calls.lock().unwrap()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        "scripted"
    }

    async fn connect(&self) -> Result<bool, SyncError> {
        next(&self.connect)
    }

    async fn validate_connection(&self) -> Result<bool, SyncError> {
        next(&self.validate)
    }

    async fn fetch_data(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<FetchedData, SyncError> {
        *self.fetch_calls.lock().unwrap() += 1;
        next(&self.fetch)
    }
}

/// Channel that records delivered alerts and can be told to fail
pub struct RecordingChannel {
    name: String,
    failure: Option<DeliveryError>,
    delivered: Mutex<Vec<Alert>>,
    attempts: Mutex<u32>,
}

impl RecordingChannel {
    /// Channel that accepts every alert
    pub fn accepting(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failure: None,
            delivered: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
        })
    }

    /// Channel that fails every attempt with `error`
    pub fn failing(name: &str, error: DeliveryError) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failure: Some(error),
            delivered: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
        })
    }

    /// Alerts accepted so far
    pub fn delivered(&self) -> Vec<Alert> {
        self.delivered.lock().unwrap().clone()
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_once(&self, alert: &Alert) -> Result<(), DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => {
                self.delivered.lock().unwrap().push(alert.clone());
                Ok(())
            }
        }
    }
}

/// Alert service over the given channels, retrying without sleeping
pub fn create_test_alert_service(
    db: Arc<SqliteDatabase>,
    channels: Vec<Arc<RecordingChannel>>,
) -> Arc<AlertService<SqliteDatabase>> {
    let routes = channels
        .into_iter()
        .map(|c| ChannelRoute::new(c, RetryConfig::immediate(3)))
        .collect();
    Arc::new(AlertService::new(db, AlertDispatcher::new(routes), 24))
}
