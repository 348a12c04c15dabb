//! Job scheduler for periodic syncs and checks
//!
//! The scheduler is an explicit value owned by `main`. It holds a table of
//! jobs, each bound to a source key and a trigger, and runs every job in its
//! own task. A job whose source already has a run in flight is skipped, which
//! keeps a single writer per source health record. Runs are never cancelled
//! mid-attempt; shutdown waits for in-flight runs to finish.

use crate::config::{SchedulerSettings, TriggerConfig};
use crate::error::{SchedulerError, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Initial delay before the first run (seconds), for startup load distribution
    pub initial_delay_secs: u64,
    /// Jitter range (seconds) added before each interval run
    pub jitter_secs: u64,
    /// Whether every job runs once right after the initial delay
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            initial_delay_secs: settings.initial_delay_secs,
            jitter_secs: settings.jitter_secs,
            run_on_start: settings.run_on_start,
        }
    }
}

/// When a job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed period between runs
    Interval(Duration),
    /// Once a day at a UTC wall-clock time
    Daily {
        /// Hour of day (0-23)
        hour: u32,
        /// Minute of hour (0-59)
        minute: u32,
    },
}

impl Trigger {
    /// First fire time strictly after `now`
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Trigger::Interval(every) => {
                now + ChronoDuration::from_std(every).unwrap_or_else(|_| ChronoDuration::hours(1))
            }
            Trigger::Daily { hour, minute } => {
                let at = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
                let today = now.date_naive().and_time(at).and_utc();
                if today > now {
                    today
                } else {
                    today + ChronoDuration::days(1)
                }
            }
        }
    }
}

impl From<&TriggerConfig> for Trigger {
    fn from(config: &TriggerConfig) -> Self {
        match *config {
            TriggerConfig::Interval { every_secs } => {
                Trigger::Interval(Duration::from_secs(every_secs.max(1)))
            }
            TriggerConfig::Daily { hour, minute } => Trigger::Daily { hour, minute },
        }
    }
}

/// Summary returned by a job run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    /// Records processed
    pub records: u64,
    /// Alerts raised (sent or suppressed)
    pub alerts_raised: u32,
    /// Free-form detail for logs and status
    pub detail: Option<String>,
}

/// Work executed on each trigger
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Perform one run
    async fn run(&self) -> Result<JobReport, SyncError>;
}

/// A scheduled unit of work
#[derive(Clone)]
pub struct Job {
    /// Unique job id
    pub id: String,
    /// Source whose state this job writes; at most one run per key at a time
    pub source_key: String,
    /// When the job fires
    pub trigger: Trigger,
    /// What the job does
    pub handler: Arc<dyn JobHandler>,
}

impl Job {
    /// Create a job
    pub fn new(
        id: impl Into<String>,
        source_key: impl Into<String>,
        trigger: Trigger,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            source_key: source_key.into(),
            trigger,
            handler,
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("source_key", &self.source_key)
            .field("trigger", &self.trigger)
            .finish()
    }
}

/// Status of a job
#[derive(Debug, Clone, Default)]
pub struct JobStatus {
    /// Last time a run finished
    pub last_run: Option<DateTime<Utc>>,
    /// Last run result
    pub last_result: Option<Result<JobReport, String>>,
    /// Next scheduled run
    pub next_run: Option<DateTime<Utc>>,
    /// Whether a run is currently in progress
    pub in_progress: bool,
    /// Runs skipped because the source was busy
    pub skipped_runs: u64,
}

type StatusMap = Arc<RwLock<HashMap<String, JobStatus>>>;
type InFlight = Arc<Mutex<HashSet<String>>>;

/// Manual run request
struct ManualRunRequest {
    job_id: String,
    response: oneshot::Sender<Result<JobReport, SchedulerError>>,
}

/// Removes a source key from the in-flight set when dropped
struct InFlightGuard {
    in_flight: InFlight,
    key: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, key: &str) -> Option<Self> {
        let mut set = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.to_string()) {
            return None;
        }
        Some(Self {
            in_flight: in_flight.clone(),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

/// Scheduler for sync and check jobs
pub struct Scheduler {
    config: SchedulerConfig,
    jobs: Vec<Arc<Job>>,
    status: StatusMap,
    in_flight: InFlight,
    shutdown_rx: broadcast::Receiver<()>,
    manual_rx: mpsc::Receiver<ManualRunRequest>,
    manual_tx: mpsc::Sender<ManualRunRequest>,
}

impl Scheduler {
    /// Create a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Scheduler configuration
    /// * `jobs` - Jobs to manage
    /// * `shutdown_rx` - Broadcast receiver for shutdown signal
    pub fn new(
        config: SchedulerConfig,
        jobs: Vec<Job>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (manual_tx, manual_rx) = mpsc::channel(32);

        let status = jobs
            .iter()
            .map(|j| (j.id.clone(), JobStatus::default()))
            .collect();

        Self {
            config,
            jobs: jobs.into_iter().map(Arc::new).collect(),
            status: Arc::new(RwLock::new(status)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown_rx,
            manual_rx,
            manual_tx,
        }
    }

    /// Get a handle for triggering manual runs and reading status
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            tx: self.manual_tx.clone(),
            status: self.status.clone(),
        }
    }

    /// Run the scheduler until shutdown is signaled
    pub async fn run(mut self) {
        info!(jobs = self.jobs.len(), "Starting scheduler");

        if self.config.initial_delay_secs > 0 {
            debug!(
                delay_secs = self.config.initial_delay_secs,
                "Waiting for initial delay"
            );
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.config.initial_delay_secs)) => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received before first run");
                    return;
                }
            }
        }

        let mut handles = Vec::new();
        let (task_shutdown_tx, _) = broadcast::channel::<()>(1);

        for job in &self.jobs {
            let job = job.clone();
            let status = self.status.clone();
            let in_flight = self.in_flight.clone();
            let config = self.config.clone();
            let task_shutdown_rx = task_shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                Self::run_job_loop(job, status, in_flight, config, task_shutdown_rx).await;
            }));
        }

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    let _ = task_shutdown_tx.send(());
                    break;
                }
                Some(request) = self.manual_rx.recv() => {
                    self.handle_manual_run(request);
                }
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("Scheduler stopped");
    }

    async fn run_job_loop(
        job: Arc<Job>,
        status: StatusMap,
        in_flight: InFlight,
        config: SchedulerConfig,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        if config.run_on_start {
            info!(job = %job.id, "Performing initial run");
            let _ = Self::perform_job(&job, &status, &in_flight).await;
        } else {
            Self::set_next_run(&job, &status).await;
        }

        match job.trigger {
            Trigger::Interval(every) => {
                let mut timer = interval_at(Instant::now() + every, every);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            debug!(job = %job.id, "Job task shutting down");
                            break;
                        }
                        _ = timer.tick() => {
                            let jitter = if config.jitter_secs > 0 {
                                rand::thread_rng().gen_range(0..config.jitter_secs)
                            } else {
                                0
                            };
                            if jitter > 0 {
                                debug!(job = %job.id, jitter_secs = jitter, "Applying jitter");
                                tokio::time::sleep(Duration::from_secs(jitter)).await;
                            }

                            info!(job = %job.id, "Performing scheduled run");
                            let _ = Self::perform_job(&job, &status, &in_flight).await;
                        }
                    }
                }
            }
            Trigger::Daily { .. } => loop {
                let now = Utc::now();
                let wait = (job.trigger.next_after(now) - now)
                    .to_std()
                    .unwrap_or(Duration::from_secs(1));
                debug!(job = %job.id, wait_secs = wait.as_secs(), "Scheduled next daily run");

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(job = %job.id, "Job task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {
                        info!(job = %job.id, "Performing scheduled run");
                        let _ = Self::perform_job(&job, &status, &in_flight).await;
                    }
                }
            },
        }
    }

    async fn set_next_run(job: &Job, status: &StatusMap) {
        let mut status_map = status.write().await;
        if let Some(s) = status_map.get_mut(&job.id) {
            s.next_run = Some(job.trigger.next_after(Utc::now()));
        }
    }

    async fn perform_job(
        job: &Job,
        status: &StatusMap,
        in_flight: &InFlight,
    ) -> Result<JobReport, SchedulerError> {
        let Some(_guard) = InFlightGuard::acquire(in_flight, &job.source_key) else {
            warn!(
                job = %job.id,
                source = %job.source_key,
                "Skipping run, source already has a run in progress"
            );
            let mut status_map = status.write().await;
            if let Some(s) = status_map.get_mut(&job.id) {
                s.skipped_runs += 1;
            }
            return Err(SchedulerError::AlreadyRunning(job.source_key.clone()));
        };

        {
            let mut status_map = status.write().await;
            if let Some(s) = status_map.get_mut(&job.id) {
                s.in_progress = true;
            }
        }

        let result = job.handler.run().await;

        let mut status_map = status.write().await;
        if let Some(s) = status_map.get_mut(&job.id) {
            s.in_progress = false;
            s.last_run = Some(Utc::now());
            s.next_run = Some(job.trigger.next_after(Utc::now()));
            s.last_result = Some(match &result {
                Ok(report) => Ok(report.clone()),
                Err(err) => Err(err.to_string()),
            });
        }

        match result {
            Ok(report) => {
                info!(
                    job = %job.id,
                    records = report.records,
                    alerts = report.alerts_raised,
                    "Job completed"
                );
                Ok(report)
            }
            Err(err) => {
                error!(job = %job.id, error = %err, "Job failed");
                Err(SchedulerError::JobFailed(err.to_string()))
            }
        }
    }

    fn handle_manual_run(&self, request: ManualRunRequest) {
        let Some(job) = self.jobs.iter().find(|j| j.id == request.job_id).cloned() else {
            warn!(job = %request.job_id, "Manual run requested for unknown job");
            let _ = request
                .response
                .send(Err(SchedulerError::JobNotFound(request.job_id)));
            return;
        };

        info!(job = %job.id, "Manual run triggered");
        let status = self.status.clone();
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            let result = Self::perform_job(&job, &status, &in_flight).await;
            let _ = request.response.send(result);
        });
    }
}

/// Handle for triggering manual runs and reading job status
#[derive(Clone)]
pub struct JobHandle {
    tx: mpsc::Sender<ManualRunRequest>,
    status: StatusMap,
}

impl JobHandle {
    /// Run the given job now and wait for its result
    pub async fn trigger(&self, job_id: &str) -> Result<JobReport, SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.tx
            .send(ManualRunRequest {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| SchedulerError::NotRunning)?;

        response_rx.await.map_err(|_| SchedulerError::NotRunning)?
    }

    /// Current status of one job
    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.status.read().await.get(job_id).cloned()
    }
}
