//! syncwarden - resilient scheduled ingestion with deduplicated alerting
//!
//! This is the main entry point for the syncwarden service.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use syncwarden::alerts::{AlertDispatcher, AlertService};
use syncwarden::config::Config;
use syncwarden::connectors::HttpConnector;
use syncwarden::database::SqliteDatabase;
use syncwarden::health::SourceHealthTracker;
use syncwarden::logging::init_tracing;
use syncwarden::sync::{
    HttpClientWithRateLimit, Job, Scheduler, SchedulerConfig, StalenessJob, SyncJob,
    SyncOrchestrator, Trigger,
};

/// syncwarden - resilient scheduled ingestion with deduplicated alerting
#[derive(Parser, Debug)]
#[command(name = "syncwarden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "SYNCWARDEN_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        sources = config.sources.len(),
        "Starting syncwarden"
    );

    // Initialize database
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let database = Arc::new(SqliteDatabase::new(&config.database.path).await?);
    info!(path = %config.database.path, "Database initialized");

    let tracker = Arc::new(SourceHealthTracker::new(
        Arc::clone(&database),
        config.health.clone(),
    ));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::clone(&tracker),
        config.retry.clone(),
    ));

    let dispatcher = AlertDispatcher::from_config(&config.alerts)?;
    info!(channels = ?dispatcher.channel_names(), "Alert channels initialized");
    let alerts = Arc::new(AlertService::new(
        Arc::clone(&database),
        dispatcher,
        config.alerts.dedup_window_hours,
    ));

    let http = Arc::new(HttpClientWithRateLimit::new(config.rate_limit.clone())?);

    let jobs = build_jobs(&config, &orchestrator, &tracker, &alerts, &http);
    if jobs.is_empty() {
        warn!("No sources configured, nothing to schedule");
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = Scheduler::new(
        SchedulerConfig::from(&config.scheduler),
        jobs,
        shutdown_rx,
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Scheduler task failed");
    }

    info!("syncwarden shutdown complete");
    Ok(())
}

/// One sync job per configured source plus the staleness check
fn build_jobs(
    config: &Config,
    orchestrator: &Arc<SyncOrchestrator<SqliteDatabase>>,
    tracker: &Arc<SourceHealthTracker<SqliteDatabase>>,
    alerts: &Arc<AlertService<SqliteDatabase>>,
    http: &Arc<HttpClientWithRateLimit>,
) -> Vec<Job> {
    let mut names: Vec<&String> = config.sources.keys().collect();
    names.sort();

    let mut jobs = Vec::with_capacity(names.len() + 1);
    for name in &names {
        let source = &config.sources[*name];
        let connector = Arc::new(HttpConnector::new(
            name.as_str(),
            source.clone(),
            Arc::clone(http),
        ));

        let mut job = SyncJob::new(Arc::clone(orchestrator), connector, source.lookback_hours)
            .with_alerts(Arc::clone(alerts));
        if let Some(retry) = &source.retry {
            job = job.with_retry(retry.clone());
        }

        info!(
            source = %name,
            url = %source.url,
            trigger = ?source.trigger,
            "Sync job registered"
        );
        jobs.push(Job::new(
            format!("sync:{}", name),
            name.as_str(),
            Trigger::from(&source.trigger),
            Arc::new(job),
        ));
    }

    if !names.is_empty() {
        let checked = names
            .iter()
            .map(|name| ((*name).clone(), config.sources[*name].max_age_hours))
            .collect();
        let staleness = StalenessJob::new(Arc::clone(tracker), Arc::clone(alerts), checked);
        jobs.push(Job::new(
            "staleness",
            "staleness",
            Trigger::Interval(Duration::from_secs(config.alerts.staleness_check_secs.max(1))),
            Arc::new(staleness),
        ));
    }

    jobs
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
