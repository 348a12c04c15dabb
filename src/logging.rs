//! Tracing subscriber setup

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Logging setup errors
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

/// Map a configured level name to a filter; unknown names fall back to info
pub fn level_filter(level: &str) -> LevelFilter {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    LevelFilter::from_level(level)
}

/// Install the global subscriber
///
/// `format: json` (default) writes one JSON object per event; `pretty`
/// writes human-readable lines.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = level_filter(&config.level);

    if config.format.eq_ignore_ascii_case("pretty") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| LoggingError::Init(e.to_string()))
    }
}
