//! Application error types for syncwarden
//!
//! This module defines the error types used throughout the application and the
//! classification trait that tells the retry machinery whether a failure is
//! worth another attempt. All error types use `thiserror`.

use thiserror::Error;

use crate::sync::classify::{classify_http_status, classify_message, classify_smtp_code};

/// Outcome of classifying a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient failure, another attempt may succeed
    Retryable,
    /// Permanent failure, retrying cannot help
    Fatal,
}

/// Trait for determining whether an error is retryable
pub trait Classify {
    /// Classify this error
    fn classify(&self) -> ErrorClass;

    /// Returns true if the error is retryable
    fn is_retryable(&self) -> bool {
        self.classify() == ErrorClass::Retryable
    }
}

/// Errors raised by connectors while talking to a data source
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// Request timed out
    #[error("Network timeout: {0}")]
    Timeout(String),

    /// Connection could not be established or was dropped
    #[error("Connection failed: {0}")]
    Connection(String),

    /// OS-level I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Rate limited by upstream
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Upstream answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code returned by upstream
        status: u16,
        /// Response excerpt or reason
        message: String,
    },

    /// Credentials rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Payload could not be understood
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Connector is misconfigured
    #[error("Configuration error: {0}")]
    Config(String),

    /// `connect()` reported failure
    #[error("Connection rejected by source")]
    ConnectionRejected,

    /// `validate_connection()` reported failure
    #[error("Connection validation rejected by source")]
    ValidationRejected,

    /// Anything else, classified by message
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl Classify for SyncError {
    fn classify(&self) -> ErrorClass {
        match self {
            SyncError::Timeout(_) => ErrorClass::Retryable,
            SyncError::Connection(_) => ErrorClass::Retryable,
            SyncError::Io(_) => ErrorClass::Retryable,
            SyncError::RateLimited(_) => ErrorClass::Retryable,
            SyncError::Http { status, .. } => classify_http_status(*status),

            SyncError::Unauthorized(_) => ErrorClass::Fatal,
            SyncError::InvalidData(_) => ErrorClass::Fatal,
            SyncError::Config(_) => ErrorClass::Fatal,
            SyncError::ConnectionRejected => ErrorClass::Fatal,
            SyncError::ValidationRejected => ErrorClass::Fatal,

            SyncError::Other(message) => classify_message(message),
        }
    }
}

/// Errors raised by an alert channel on a single delivery attempt
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeliveryError {
    /// SMTP server replied with an error code
    #[error("SMTP {code}: {message}")]
    Smtp {
        /// Three-digit SMTP reply code
        code: u16,
        /// Server reply text
        message: String,
    },

    /// Webhook endpoint answered with a non-success HTTP status
    #[error("HTTP {status}")]
    Http {
        /// Status code returned by the endpoint
        status: u16,
    },

    /// Request timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Connection could not be established
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Credentials rejected by the channel
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Message could not be built (bad address, bad payload)
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Anything else, classified by message
    #[error("{0}")]
    Other(String),
}

impl Classify for DeliveryError {
    fn classify(&self) -> ErrorClass {
        match self {
            DeliveryError::Smtp { code, .. } => classify_smtp_code(*code),
            DeliveryError::Http { status } => classify_http_status(*status),
            DeliveryError::Timeout(_) => ErrorClass::Retryable,
            DeliveryError::Connection(_) => ErrorClass::Retryable,
            DeliveryError::Auth(_) => ErrorClass::Fatal,
            DeliveryError::InvalidPayload(_) => ErrorClass::Fatal,
            DeliveryError::Other(message) => classify_message(message),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Error from the async connection wrapper
    #[error("Database connection error: {0}")]
    Connection(#[from] tokio_rusqlite::Error),

    /// Stored JSON column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record not found
    #[error("Record not found")]
    NotFound,
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Scheduler-related errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    /// No job registered under this id
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Another run for the same source is still in flight
    #[error("Source {0} already has a sync in progress")]
    AlreadyRunning(String),

    /// Job handler reported failure
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Scheduler loop is not running
    #[error("Scheduler not running")]
    NotRunning,
}
