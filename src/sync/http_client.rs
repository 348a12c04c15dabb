//! Rate-limited HTTP client for source API calls
//!
//! This module provides an HTTP client with built-in rate limiting and
//! request interval control. Transport failures and response statuses are
//! mapped onto [`SyncError`] so the retry executor can classify them.

use crate::config::RateLimitConfig;
use crate::error::SyncError;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

/// Characters of an error response body kept in the error message
const ERROR_BODY_EXCERPT: usize = 200;

/// HTTP client with rate limiting capabilities
///
/// Features:
/// - Per-host request interval enforcement
/// - Global concurrent request limiting via semaphore
/// - HTTP 429 handling with Retry-After support
#[derive(Debug)]
pub struct HttpClientWithRateLimit {
    client: Client,
    semaphore: Arc<Semaphore>,
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
    config: RateLimitConfig,
}

impl HttpClientWithRateLimit {
    /// Create a new rate-limited HTTP client
    pub fn new(config: RateLimitConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SyncError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a rate-limited HTTP client with a custom reqwest Client
    pub fn with_client(client: Client, config: RateLimitConfig) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            last_request: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Perform a GET request and return the body of a 2xx response
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Bytes, SyncError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| SyncError::Other("HTTP client is shut down".to_string()))?;

        self.wait_for_rate_limit(url).await;

        debug!(url = url, "Sending HTTP GET request");

        let response = self
            .client
            .get(url)
            .query(query)
            .headers(build_headers(headers)?)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await.map_err(map_transport_error)?;
            debug!(url = url, body_size = body.len(), "Received response");
            return Ok(body);
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let wait = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(self.config.rate_limit_wait_secs);

                warn!(url = url, retry_after = wait, "Rate limited by upstream");
                Err(SyncError::RateLimited(wait))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(url = url, status = status.as_u16(), "Unauthorized");
                Err(SyncError::Unauthorized(format!(
                    "{} returned {}",
                    url,
                    status.as_u16()
                )))
            }
            status => {
                let excerpt: String = response
                    .text()
                    .await
                    .unwrap_or_default()
                    .chars()
                    .take(ERROR_BODY_EXCERPT)
                    .collect();
                let message = if excerpt.trim().is_empty() {
                    status.canonical_reason().unwrap_or("error").to_string()
                } else {
                    excerpt
                };

                warn!(url = url, status = status.as_u16(), "Unexpected status");
                Err(SyncError::Http {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Perform a GET request and parse the body as JSON
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<serde_json::Value, SyncError> {
        let body = self.get(url, query, headers, timeout).await?;
        serde_json::from_slice(&body)
            .map_err(|e| SyncError::InvalidData(format!("Response is not valid JSON: {}", e)))
    }

    /// Wait for the rate limit interval to pass for the given URL's host
    async fn wait_for_rate_limit(&self, url: &str) {
        let domain = extract_domain(url);
        let min_interval = Duration::from_millis(self.config.min_interval_ms);

        let mut last_requests = self.last_request.lock().await;

        if let Some(last) = last_requests.get(&domain) {
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!(
                    domain = domain,
                    wait_ms = wait_time.as_millis(),
                    "Waiting for rate limit"
                );
                drop(last_requests);
                tokio::time::sleep(wait_time).await;
                last_requests = self.last_request.lock().await;
            }
        }

        last_requests.insert(domain, Instant::now());
    }

    /// Get current configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Get number of available permits (concurrent request slots)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap, SyncError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| SyncError::Config(format!("Invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SyncError::Config(format!("Invalid header value for {}: {}", name, e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn map_transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() || e.is_body() {
        SyncError::Connection(e.to_string())
    } else if e.is_decode() {
        SyncError::InvalidData(e.to_string())
    } else {
        SyncError::Other(e.to_string())
    }
}

/// Extract host from URL for rate limiting purposes
fn extract_domain(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or(url)
        .to_string()
}
