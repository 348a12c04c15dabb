//! Sync infrastructure
//!
//! Retry, backoff and error classification, the connector capability set,
//! the sequential orchestrator, a rate-limited HTTP client and the job
//! scheduler.
//!
//! # Example
//!
//! ```ignore
//! use syncwarden::sync::{RetryExecutor, SyncOrchestrator};
//! use syncwarden::config::RetryConfig;
//!
//! let retry = RetryExecutor::new(RetryConfig::default());
//! let (result, stats) = retry.execute(|| async { connector.connect().await }).await;
//! ```

pub mod backoff;
pub mod classify;
pub mod connector;
pub mod http_client;
pub mod jobs;
pub mod orchestrator;
pub mod retry;
pub mod scheduler;

// Re-export main types for convenience
pub use backoff::BackoffPolicy;
pub use connector::{Connector, FetchedData};
pub use http_client::HttpClientWithRateLimit;
pub use jobs::{StalenessJob, SyncJob};
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncStage};
pub use retry::{RetryExecutor, RetryStats};
pub use scheduler::{
    Job, JobHandle, JobHandler, JobReport, JobStatus, Scheduler, SchedulerConfig, Trigger,
};
