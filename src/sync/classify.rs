//! Pure classification rules for transient versus permanent failures
//!
//! Error types implement [`Classify`](crate::error::Classify) by delegating to
//! the functions here. SMTP reply codes follow the opposite convention of
//! plain HTTP: a 4xx SMTP reply is a temporary condition.

use crate::error::ErrorClass;

/// Lowercase message fragments that mark a failure as transient
pub const TRANSIENT_PATTERNS: &[&str] = &[
    "rate limit",
    "too many requests",
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "temporarily unavailable",
    "try again",
];

/// HTTP status codes that mark a free-form message as transient
pub const TRANSIENT_STATUS_CODES: &[&str] = &["429", "500", "502", "503", "504"];

/// Classify an HTTP status code
///
/// 429 and every 5xx are retryable; everything else is fatal.
pub fn classify_http_status(status: u16) -> ErrorClass {
    match status {
        429 => ErrorClass::Retryable,
        500..=599 => ErrorClass::Retryable,
        _ => ErrorClass::Fatal,
    }
}

/// Classify an SMTP reply code
///
/// 4xx replies are transient; 5xx and anything unexpected are fatal.
pub fn classify_smtp_code(code: u16) -> ErrorClass {
    match code {
        400..=499 => ErrorClass::Retryable,
        _ => ErrorClass::Fatal,
    }
}

/// Classify a free-form error message
///
/// A message is transient when it contains one of [`TRANSIENT_PATTERNS`],
/// mentions a retryable HTTP status as a standalone number, or reports a
/// failed connection. SMTP replies never reach this path; they carry a
/// reply code and go through [`classify_smtp_code`].
pub fn classify_message(message: &str) -> ErrorClass {
    let lowered = message.to_lowercase();

    let transient_fragment = TRANSIENT_PATTERNS.iter().any(|p| lowered.contains(p));
    let transient_status = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| TRANSIENT_STATUS_CODES.contains(&token));
    let connection_failed = lowered.contains("connection") && lowered.contains("failed");

    if transient_fragment || transient_status || connection_failed {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}
