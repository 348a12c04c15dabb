//! Multi-channel alert dispatch
//!
//! Every channel gets its own retry loop, so a dead webhook never eats the
//! email channel's attempts. The dispatcher does not know about dedup; that
//! happens one layer up in [`crate::alerts::AlertService`].

use std::sync::Arc;

use tracing::{error, info, warn};

use super::channels::{AlertChannel, EmailChannel, WebhookChannel};
use crate::config::{AlertsConfig, RetryConfig};
use crate::error::DeliveryError;
use crate::models::{Alert, DeliveryRecord, DispatchReport};
use crate::sync::retry::{RetryExecutor, RetryStats};

/// A channel together with its retry policy
#[derive(Clone)]
pub struct ChannelRoute {
    /// Channel to deliver through
    pub channel: Arc<dyn AlertChannel>,
    /// Retry policy for this channel
    pub retry: RetryConfig,
}

impl ChannelRoute {
    /// Create a route
    pub fn new(channel: Arc<dyn AlertChannel>, retry: RetryConfig) -> Self {
        Self { channel, retry }
    }
}

/// Delivers one alert across every configured channel
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    routes: Vec<ChannelRoute>,
}

impl AlertDispatcher {
    /// Create a dispatcher over the given routes
    pub fn new(routes: Vec<ChannelRoute>) -> Self {
        Self { routes }
    }

    /// Build the configured webhook and email routes
    ///
    /// A channel's own `retry` overrides the alerts-wide default.
    pub fn from_config(config: &AlertsConfig) -> Result<Self, DeliveryError> {
        let mut routes = Vec::new();

        if let Some(webhook) = &config.webhook {
            let retry = webhook.retry.clone().unwrap_or_else(|| config.retry.clone());
            routes.push(ChannelRoute::new(Arc::new(WebhookChannel::new(webhook)?), retry));
        }

        if let Some(email) = &config.email {
            let retry = email.retry.clone().unwrap_or_else(|| config.retry.clone());
            routes.push(ChannelRoute::new(Arc::new(EmailChannel::new(email)?), retry));
        }

        if routes.is_empty() {
            warn!("No alert channels configured, alerts will not be delivered");
        }

        Ok(Self::new(routes))
    }

    /// Names of the configured channels, in route order
    pub fn channel_names(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.channel.name()).collect()
    }

    /// True if no channel is configured
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Deliver through every channel
    ///
    /// Succeeds if at least one channel accepted the alert. With no channels
    /// the report is a failure with no results.
    pub async fn send(&self, alert: &Alert) -> DispatchReport {
        self.dispatch(alert, self.routes.iter()).await
    }

    /// Deliver through the named channels only
    pub async fn send_via(&self, alert: &Alert, channels: &[&str]) -> DispatchReport {
        let routes = self
            .routes
            .iter()
            .filter(|r| channels.contains(&r.channel.name()));
        self.dispatch(alert, routes).await
    }

    async fn dispatch<'a>(
        &self,
        alert: &Alert,
        routes: impl Iterator<Item = &'a ChannelRoute>,
    ) -> DispatchReport {
        let mut records = Vec::new();

        for route in routes {
            let channel = route.channel.clone();
            let executor = RetryExecutor::new(route.retry.clone());

            let (result, stats) = executor
                .execute(|| {
                    let channel = channel.clone();
                    async move { channel.send_once(alert).await }
                })
                .await;

            if let Err(err) = &result {
                warn!(
                    alert_id = %alert.id,
                    channel = channel.name(),
                    attempts = stats.attempts,
                    error = %err,
                    "Channel failed to deliver alert"
                );
            }

            records.push(delivery_record(channel.name(), stats));
        }

        let report = DispatchReport::from_records(records);

        if report.success {
            info!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                attempts = report.total_attempts,
                failed_channels = ?report.failed_channels(),
                "Alert delivered"
            );
        } else {
            error!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                channels = report.results.len(),
                "Alert delivery failed on every channel"
            );
        }

        report
    }
}

fn delivery_record(channel: &str, stats: RetryStats) -> DeliveryRecord {
    DeliveryRecord {
        channel: channel.to_string(),
        success: stats.success,
        attempts: stats.attempts,
        total_delay_seconds: stats.total_delay_seconds,
        final_error: if stats.success {
            None
        } else {
            stats.last_error
        },
        errors: stats.errors,
    }
}
