//! Configuration management for syncwarden
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::sync::backoff::MAX_DELAY_SECS;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Default retry policy for connector calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Health scoring thresholds
    #[serde(default)]
    pub health: HealthConfig,

    /// Rate limiting for outgoing HTTP requests to sources
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Data sources keyed by source name
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,

    /// Alert delivery configuration
    #[serde(default)]
    pub alerts: AlertsConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml)?;
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables with prefix SYNCWARDEN_
    ///
    /// Sources cannot be declared this way; an environment-only deployment
    /// runs the alerting side with an empty source table.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("SYNCWARDEN_DATABASE_PATH") {
            config.database.path = path;
        }

        if let Ok(level) = std::env::var("SYNCWARDEN_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("SYNCWARDEN_LOG_FORMAT") {
            config.logging.format = format;
        }

        if let Ok(attempts) = std::env::var("SYNCWARDEN_RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = attempts
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid retry max attempts".to_string()))?;
        }

        if let Ok(hours) = std::env::var("SYNCWARDEN_ALERTS_DEDUP_WINDOW_HOURS") {
            config.alerts.dedup_window_hours = hours
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid dedup window".to_string()))?;
        }
        if let Ok(url) = std::env::var("SYNCWARDEN_ALERTS_WEBHOOK_URL") {
            config.alerts.webhook = Some(WebhookConfig {
                url,
                ..WebhookConfig::default()
            });
        }
        if let Ok(host) = std::env::var("SYNCWARDEN_SMTP_HOST") {
            let mut email = EmailConfig {
                smtp_host: host,
                ..EmailConfig::default()
            };
            if let Ok(port) = std::env::var("SYNCWARDEN_SMTP_PORT") {
                email.smtp_port = port
                    .parse()
                    .map_err(|_| ConfigError::Parse("Invalid SMTP port".to_string()))?;
            }
            email.username = std::env::var("SYNCWARDEN_SMTP_USERNAME").ok();
            email.password = std::env::var("SYNCWARDEN_SMTP_PASSWORD").ok();
            if let Ok(from) = std::env::var("SYNCWARDEN_ALERTS_EMAIL_FROM") {
                email.from = from;
            }
            if let Ok(to) = std::env::var("SYNCWARDEN_ALERTS_EMAIL_TO") {
                email.to = to
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            config.alerts.email = Some(email);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate("retry")?;
        self.alerts.retry.validate("alerts.retry")?;
        if let Some(retry) = self.alerts.webhook.as_ref().and_then(|w| w.retry.as_ref()) {
            retry.validate("alerts.webhook.retry")?;
        }
        if let Some(retry) = self.alerts.email.as_ref().and_then(|e| e.retry.as_ref()) {
            retry.validate("alerts.email.retry")?;
        }

        for (name, source) in &self.sources {
            if let Some(retry) = &source.retry {
                retry.validate(&format!("sources.{}.retry", name))?;
            }
            if source.url.trim().is_empty() {
                return Err(ConfigError::MissingRequired(format!(
                    "sources.{}.url",
                    name
                )));
            }
            if let TriggerConfig::Daily { hour, minute } = source.trigger {
                if hour > 23 || minute > 59 {
                    return Err(ConfigError::InvalidValue(format!(
                        "sources.{}.trigger: {:02}:{:02} is not a valid time of day",
                        name, hour, minute
                    )));
                }
            }
            if let TriggerConfig::Interval { every_secs: 0 } = source.trigger {
                return Err(ConfigError::InvalidValue(format!(
                    "sources.{}.trigger.every_secs must be greater than zero",
                    name
                )));
            }
        }

        let health = &self.health;
        if health.unhealthy_after < health.degraded_after {
            return Err(ConfigError::InvalidValue(
                "health.unhealthy_after must not be lower than health.degraded_after".to_string(),
            ));
        }
        if health.healthy_score > 100 || health.degraded_score > 100 || health.unhealthy_score > 100
        {
            return Err(ConfigError::InvalidValue(
                "health scores must be within 0..=100".to_string(),
            ));
        }

        if let Some(email) = &self.alerts.email {
            if email.to.is_empty() {
                return Err(ConfigError::MissingRequired("alerts.email.to".to_string()));
            }
        }

        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "data/syncwarden.db".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Scheduler timing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerSettings {
    /// Delay before the first scheduled run in seconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,

    /// Maximum random delay added to interval runs in seconds
    #[serde(default = "default_scheduler_jitter")]
    pub jitter_secs: u64,

    /// Whether every job runs once right after startup
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay(),
            jitter_secs: default_scheduler_jitter(),
            run_on_start: default_run_on_start(),
        }
    }
}

fn default_initial_delay() -> u64 {
    5
}

fn default_scheduler_jitter() -> u64 {
    30
}

fn default_run_on_start() -> bool {
    true
}

/// Retry configuration for connector calls and alert channels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in seconds
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: f64,

    /// Upper bound for a single delay in seconds
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Whether to add jitter to each delay
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            exponential_base: default_exponential_base(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Retry policy used for alert channels
    pub fn alert_defaults() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 2.0,
            max_delay_secs: 30.0,
            exponential_base: 2.0,
            jitter: true,
        }
    }

    /// Reject delays and growth factors the backoff policy cannot honor
    ///
    /// `field` is the config path used in the error message.
    pub fn validate(&self, field: &str) -> Result<(), ConfigError> {
        for (name, value) in [
            ("base_delay_secs", self.base_delay_secs),
            ("max_delay_secs", self.max_delay_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{}.{} must be a finite, non-negative number of seconds",
                    field, name
                )));
            }
            if value > MAX_DELAY_SECS {
                return Err(ConfigError::InvalidValue(format!(
                    "{}.{} must not exceed {} seconds",
                    field, name, MAX_DELAY_SECS
                )));
            }
        }
        if self.max_delay_secs < self.base_delay_secs {
            return Err(ConfigError::InvalidValue(format!(
                "{}.max_delay_secs must not be lower than base_delay_secs",
                field
            )));
        }
        if !self.exponential_base.is_finite() || self.exponential_base < 1.0 {
            return Err(ConfigError::InvalidValue(format!(
                "{}.exponential_base must be at least 1.0",
                field
            )));
        }
        Ok(())
    }

    /// Policy that never sleeps, for callers that only need attempt counting
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_secs: 0.0,
            max_delay_secs: 0.0,
            exponential_base: 2.0,
            jitter: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> f64 {
    1.0
}

fn default_max_delay() -> f64 {
    60.0
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

/// Consecutive-failure thresholds and the scores they map to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    /// Failure count at which a source becomes degraded
    #[serde(default = "default_degraded_after")]
    pub degraded_after: u32,

    /// Failure count at which a source becomes unhealthy
    #[serde(default = "default_unhealthy_after")]
    pub unhealthy_after: u32,

    /// Score below the degraded threshold
    #[serde(default = "default_healthy_score")]
    pub healthy_score: u8,

    /// Score between the two thresholds
    #[serde(default = "default_degraded_score")]
    pub degraded_score: u8,

    /// Score at or above the unhealthy threshold
    #[serde(default = "default_unhealthy_score")]
    pub unhealthy_score: u8,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_after: default_degraded_after(),
            unhealthy_after: default_unhealthy_after(),
            healthy_score: default_healthy_score(),
            degraded_score: default_degraded_score(),
            unhealthy_score: default_unhealthy_score(),
        }
    }
}

fn default_degraded_after() -> u32 {
    3
}

fn default_unhealthy_after() -> u32 {
    5
}

fn default_healthy_score() -> u8 {
    100
}

fn default_degraded_score() -> u8 {
    30
}

fn default_unhealthy_score() -> u8 {
    0
}

/// Rate limiting configuration for HTTP clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Minimum interval between requests to the same host in milliseconds
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Maximum number of concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Assumed wait when a 429 carries no Retry-After header, in seconds
    #[serde(default = "default_rate_limit_wait")]
    pub rate_limit_wait_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            max_concurrent: default_max_concurrent(),
            rate_limit_wait_secs: default_rate_limit_wait(),
        }
    }
}

fn default_min_interval() -> u64 {
    250
}

fn default_max_concurrent() -> usize {
    4
}

fn default_rate_limit_wait() -> u64 {
    60
}

/// When a source's sync job fires
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Fixed period between runs
    Interval {
        /// Period in seconds
        every_secs: u64,
    },
    /// Once a day at a UTC wall-clock time
    Daily {
        /// Hour of day (0-23)
        hour: u32,
        /// Minute of hour (0-59)
        minute: u32,
    },
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig::Interval { every_secs: 3600 }
    }
}

/// A single data source reached through the generic HTTP connector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Data endpoint URL
    pub url: String,

    /// Optional endpoint used by connection validation
    #[serde(default)]
    pub health_url: Option<String>,

    /// Free-form type label stored on the health record
    #[serde(default = "default_source_type")]
    pub source_type: String,

    /// When the sync job runs
    #[serde(default)]
    pub trigger: TriggerConfig,

    /// Size of the fetch window ending at the run time, in hours
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,

    /// Age after which the last successful sync counts as stale, in hours
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: f64,

    /// Extra request headers (API keys and the like)
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-source retry override
    #[serde(default)]
    pub retry: Option<RetryConfig>,

    /// JSON field on array items holding the record timestamp
    #[serde(default)]
    pub timestamp_field: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
}

impl SourceConfig {
    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_source_type() -> String {
    "http".to_string()
}

fn default_lookback_hours() -> u32 {
    24
}

fn default_max_age_hours() -> f64 {
    24.0
}

fn default_source_timeout() -> u64 {
    30
}

/// Alert delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertsConfig {
    /// Window during which an equivalent alert is not resent, in hours
    #[serde(default = "default_dedup_window")]
    pub dedup_window_hours: u32,

    /// Default retry policy for every channel
    #[serde(default = "RetryConfig::alert_defaults")]
    pub retry: RetryConfig,

    /// Period of the staleness check job in seconds
    #[serde(default = "default_staleness_check")]
    pub staleness_check_secs: u64,

    /// Chat webhook channel
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,

    /// SMTP email channel
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            dedup_window_hours: default_dedup_window(),
            retry: RetryConfig::alert_defaults(),
            staleness_check_secs: default_staleness_check(),
            webhook: None,
            email: None,
        }
    }
}

fn default_dedup_window() -> u32 {
    24
}

fn default_staleness_check() -> u64 {
    3600
}

/// Chat webhook channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    /// Incoming webhook URL
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_channel_timeout")]
    pub timeout_secs: u64,

    /// Channel-specific retry override
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: default_channel_timeout(),
            retry: None,
        }
    }
}

/// SMTP email channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailConfig {
    /// SMTP relay host
    pub smtp_host: String,

    /// SMTP port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username
    #[serde(default)]
    pub username: Option<String>,

    /// SMTP password
    #[serde(default)]
    pub password: Option<String>,

    /// Sender address
    #[serde(default = "default_email_from")]
    pub from: String,

    /// Recipient addresses
    #[serde(default)]
    pub to: Vec<String>,

    /// Command timeout in seconds
    #[serde(default = "default_channel_timeout")]
    pub timeout_secs: u64,

    /// Channel-specific retry override
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from: default_email_from(),
            to: Vec::new(),
            timeout_secs: default_channel_timeout(),
            retry: None,
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_email_from() -> String {
    "syncwarden@localhost".to_string()
}

fn default_channel_timeout() -> u64 {
    30
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax. Unset variables are left untouched.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Parse(format!("env expansion pattern: {}", e)))?;

    Ok(re
        .replace_all(input, |caps: &regex_lite::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Parse complete configuration from YAML
    #[test]
    fn test_parse_complete_yaml_config() {
        let yaml = r#"
database:
  path: "/tmp/test.db"

logging:
  level: "debug"
  format: "pretty"

scheduler:
  initial_delay_secs: 1
  jitter_secs: 0
  run_on_start: false

retry:
  max_attempts: 5
  base_delay_secs: 0.5
  max_delay_secs: 10.0

health:
  degraded_after: 2
  unhealthy_after: 4

sources:
  orders:
    url: "https://api.example.com/orders"
    health_url: "https://api.example.com/ping"
    source_type: "ecommerce"
    trigger:
      type: interval
      every_secs: 900
    lookback_hours: 6
    max_age_hours: 2.5
    headers:
      X-Api-Key: "abc"
    timestamp_field: "updated_at"
  ledger:
    url: "https://ledger.example.com/entries"
    trigger:
      type: daily
      hour: 2
      minute: 30
    retry:
      max_attempts: 1

alerts:
  dedup_window_hours: 12
  staleness_check_secs: 600
  webhook:
    url: "https://hooks.example.com/T000"
  email:
    smtp_host: "smtp.example.com"
    username: "alerts"
    password: "secret"
    from: "alerts@example.com"
    to: ["ops@example.com"]
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.database.path, "/tmp/test.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
        assert!(!config.scheduler.run_on_start);
        assert_eq!(config.retry.max_attempts, 5);
        assert!((config.retry.base_delay_secs - 0.5).abs() < f64::EPSILON);
        assert!(config.retry.jitter);
        assert_eq!(config.health.degraded_after, 2);
        assert_eq!(config.health.degraded_score, 30);

        let orders = config.sources.get("orders").unwrap();
        assert_eq!(orders.source_type, "ecommerce");
        assert_eq!(orders.trigger, TriggerConfig::Interval { every_secs: 900 });
        assert_eq!(orders.lookback_hours, 6);
        assert_eq!(orders.headers.get("X-Api-Key"), Some(&"abc".to_string()));
        assert_eq!(orders.timestamp_field.as_deref(), Some("updated_at"));
        assert_eq!(orders.retry, None);

        let ledger = config.sources.get("ledger").unwrap();
        assert_eq!(ledger.source_type, "http");
        assert_eq!(
            ledger.trigger,
            TriggerConfig::Daily {
                hour: 2,
                minute: 30
            }
        );
        assert_eq!(ledger.retry.as_ref().unwrap().max_attempts, 1);

        assert_eq!(config.alerts.dedup_window_hours, 12);
        assert_eq!(
            config.alerts.webhook.as_ref().unwrap().url,
            "https://hooks.example.com/T000"
        );
        let email = config.alerts.email.as_ref().unwrap();
        assert_eq!(email.smtp_port, 587);
        assert_eq!(email.to, vec!["ops@example.com"]);
    }

    // Test 2: Default values are applied for missing fields
    #[test]
    fn test_default_values_applied() {
        let config = Config::from_yaml("logging:\n  level: warn\n").unwrap();

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.database.path, "data/syncwarden.db");
        assert!(config.sources.is_empty());

        assert_eq!(config.retry.max_attempts, 3);
        assert!((config.retry.base_delay_secs - 1.0).abs() < f64::EPSILON);
        assert!((config.retry.max_delay_secs - 60.0).abs() < f64::EPSILON);
        assert!((config.retry.exponential_base - 2.0).abs() < f64::EPSILON);
        assert!(config.retry.jitter);

        assert_eq!(config.health.degraded_after, 3);
        assert_eq!(config.health.unhealthy_after, 5);
        assert_eq!(config.health.healthy_score, 100);
        assert_eq!(config.health.unhealthy_score, 0);

        assert_eq!(config.alerts.dedup_window_hours, 24);
        assert_eq!(config.alerts.retry.max_attempts, 3);
        assert!((config.alerts.retry.base_delay_secs - 2.0).abs() < f64::EPSILON);
        assert!((config.alerts.retry.max_delay_secs - 30.0).abs() < f64::EPSILON);
        assert!(config.alerts.webhook.is_none());
    }

    // Test 3: Environment variable expansion
    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("SW_TEST_API_KEY", "env_secret");
        std::env::set_var("SW_TEST_DB_PATH", "/var/data/test.db");

        let yaml = r#"
database:
  path: "${SW_TEST_DB_PATH}"
sources:
  crm:
    url: "https://crm.example.com/contacts"
    headers:
      Authorization: "Bearer ${SW_TEST_API_KEY}"
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.database.path, "/var/data/test.db");
        assert_eq!(
            config.sources["crm"].headers.get("Authorization"),
            Some(&"Bearer env_secret".to_string())
        );

        std::env::remove_var("SW_TEST_API_KEY");
        std::env::remove_var("SW_TEST_DB_PATH");
    }

    // Test 4: from_env loads config from environment variables
    #[test]
    fn test_from_env() {
        std::env::set_var("SYNCWARDEN_DATABASE_PATH", "/env/test.db");
        std::env::set_var("SYNCWARDEN_LOG_FORMAT", "pretty");
        std::env::set_var("SYNCWARDEN_RETRY_MAX_ATTEMPTS", "7");
        std::env::set_var("SYNCWARDEN_ALERTS_WEBHOOK_URL", "https://hooks.example.com/x");
        std::env::set_var("SYNCWARDEN_SMTP_HOST", "smtp.example.com");
        std::env::set_var("SYNCWARDEN_SMTP_PORT", "2525");
        std::env::set_var("SYNCWARDEN_ALERTS_EMAIL_TO", "a@example.com, b@example.com");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database.path, "/env/test.db");
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(
            config.alerts.webhook.as_ref().unwrap().url,
            "https://hooks.example.com/x"
        );
        let email = config.alerts.email.as_ref().unwrap();
        assert_eq!(email.smtp_port, 2525);
        assert_eq!(email.to, vec!["a@example.com", "b@example.com"]);

        std::env::remove_var("SYNCWARDEN_DATABASE_PATH");
        std::env::remove_var("SYNCWARDEN_LOG_FORMAT");
        std::env::remove_var("SYNCWARDEN_RETRY_MAX_ATTEMPTS");
        std::env::remove_var("SYNCWARDEN_ALERTS_WEBHOOK_URL");
        std::env::remove_var("SYNCWARDEN_SMTP_HOST");
        std::env::remove_var("SYNCWARDEN_SMTP_PORT");
        std::env::remove_var("SYNCWARDEN_ALERTS_EMAIL_TO");
    }

    // Test 5: Parse error for invalid YAML
    #[test]
    fn test_parse_error_invalid_yaml() {
        let yaml = r#"
retry:
  max_attempts: "many"
"#;

        match Config::from_yaml(yaml) {
            Err(ConfigError::Parse(msg)) => assert!(msg.contains("Failed to parse YAML")),
            other => panic!("Expected ConfigError::Parse, got {:?}", other),
        }
    }

    // Test 6: Invalid daily trigger is rejected
    #[test]
    fn test_invalid_daily_trigger_rejected() {
        let yaml = r#"
sources:
  ledger:
    url: "https://ledger.example.com"
    trigger:
      type: daily
      hour: 24
      minute: 0
"#;

        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    // Test 7: Empty source URL is rejected
    #[test]
    fn test_missing_source_url_rejected() {
        let yaml = r#"
sources:
  broken:
    url: ""
"#;

        match Config::from_yaml(yaml) {
            Err(ConfigError::MissingRequired(field)) => assert_eq!(field, "sources.broken.url"),
            other => panic!("Expected MissingRequired, got {:?}", other),
        }
    }

    // Test 8: Inverted health thresholds are rejected
    #[test]
    fn test_inverted_health_thresholds_rejected() {
        let yaml = r#"
health:
  degraded_after: 6
  unhealthy_after: 2
"#;

        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    // Test 9: Email channel without recipients is rejected
    #[test]
    fn test_email_without_recipients_rejected() {
        let yaml = r#"
alerts:
  email:
    smtp_host: "smtp.example.com"
"#;

        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    // Test 10: Config serialization round-trip
    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = Config::default();
        config.sources.insert(
            "orders".to_string(),
            SourceConfig {
                url: "https://api.example.com/orders".to_string(),
                health_url: None,
                source_type: "http".to_string(),
                trigger: TriggerConfig::Daily { hour: 6, minute: 0 },
                lookback_hours: 24,
                max_age_hours: 30.0,
                headers: HashMap::new(),
                retry: Some(RetryConfig::immediate(2)),
                timestamp_field: None,
                timeout_secs: 10,
            },
        );

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(config, parsed);
    }

    // Test 11: Empty YAML results in defaults
    #[test]
    fn test_empty_yaml_defaults() {
        let config = Config::from_yaml("{}").unwrap();

        assert_eq!(config, Config::default());
    }

    // Test 12: Retry delays that cannot be slept are rejected
    #[test]
    fn test_invalid_retry_delays_rejected() {
        let huge = "retry:\n  base_delay_secs: 1.0e20\n  max_delay_secs: 1.0e20\n";
        let negative = "retry:\n  base_delay_secs: -1.0\n";
        let inverted = "alerts:\n  retry:\n    base_delay_secs: 10.0\n    max_delay_secs: 5.0\n";

        for yaml in [huge, negative, inverted] {
            assert!(
                matches!(Config::from_yaml(yaml), Err(ConfigError::InvalidValue(_))),
                "accepted: {}",
                yaml
            );
        }
    }

    // Test 13: A shrinking growth factor is rejected wherever a retry policy appears
    #[test]
    fn test_sub_unit_exponential_base_rejected() {
        let yaml = r#"
sources:
  orders:
    url: "https://api.example.com/orders"
    retry:
      exponential_base: 0.5
"#;
        match Config::from_yaml(yaml) {
            Err(ConfigError::InvalidValue(msg)) => {
                assert!(msg.contains("sources.orders.retry.exponential_base"))
            }
            other => panic!("Expected InvalidValue, got {:?}", other),
        }

        let yaml = r#"
alerts:
  webhook:
    url: "https://hooks.example.com/T000"
    retry:
      exponential_base: 0.5
"#;
        assert!(matches!(
            Config::from_yaml(yaml),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    // Test 14: The never-sleeping policy passes validation
    #[test]
    fn test_immediate_retry_is_valid() {
        assert!(RetryConfig::immediate(3).validate("retry").is_ok());
        assert!(RetryConfig::alert_defaults().validate("alerts.retry").is_ok());
    }
}
