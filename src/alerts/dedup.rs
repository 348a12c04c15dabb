//! Content fingerprinting for alert deduplication

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Length of the hex fingerprint kept in audits
pub const DEDUP_HASH_LEN: usize = 32;

/// Canonical form of an alert message
///
/// Lowercases, replaces every run of ASCII digits with `#`, collapses
/// whitespace to single spaces and trims. Counters, ids and timestamps inside
/// a message therefore do not defeat deduplication.
pub fn normalize_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut in_digits = false;
    let mut pending_space = false;

    for c in message.chars() {
        if c.is_whitespace() {
            in_digits = false;
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c.is_ascii_digit() {
            if !in_digits {
                out.push('#');
                in_digits = true;
            }
            continue;
        }
        in_digits = false;
        out.extend(c.to_lowercase());
    }

    out
}

/// Fingerprint of an alert for the UTC day containing `now`
///
/// SHA-256 over `"{alert_type}:{normalized message}:{YYYY-MM-DD}"`, hex
/// encoded, first 32 characters.
pub fn dedup_hash(alert_type: &str, message: &str, now: DateTime<Utc>) -> String {
    let content = format!(
        "{}:{}:{}",
        alert_type,
        normalize_message(message),
        now.format("%Y-%m-%d")
    );
    let mut hash = format!("{:x}", Sha256::digest(content.as_bytes()));
    hash.truncate(DEDUP_HASH_LEN);
    hash
}
