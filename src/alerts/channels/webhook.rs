//! Chat webhook channel (Slack-compatible incoming webhook)

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::AlertChannel;
use crate::config::WebhookConfig;
use crate::error::DeliveryError;
use crate::models::Alert;

/// Data entries shown as attachment fields
const MAX_DATA_FIELDS: usize = 5;

/// Posts alerts as a single attachment to an incoming webhook
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    /// Build a channel from configuration
    pub fn new(config: &WebhookConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DeliveryError::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config.url.clone()))
    }

    /// Build a channel around an existing client
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

/// Render the webhook body for an alert
pub fn build_payload(alert: &Alert) -> Value {
    let mut fields = vec![
        json!({
            "title": "Priority",
            "value": alert.priority.to_string(),
            "short": true,
        }),
        json!({
            "title": "Timestamp",
            "value": alert.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            "short": true,
        }),
    ];

    for (key, value) in alert.data.iter().take(MAX_DATA_FIELDS) {
        fields.push(json!({
            "title": key,
            "value": display_value(value),
            "short": true,
        }));
    }

    json!({
        "attachments": [{
            "color": alert.priority.color(),
            "title": alert.title,
            "text": alert.message,
            "fields": fields,
            "footer": "syncwarden",
            "ts": alert.created_at.timestamp(),
        }]
    })
}

pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_transport_error(err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        DeliveryError::Connection(err.to_string())
    } else {
        DeliveryError::Other(err.to_string())
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send_once(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .json(&build_payload(alert))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(alert_id = %alert.id, status = status.as_u16(), "Webhook accepted alert");
            Ok(())
        } else {
            Err(DeliveryError::Http {
                status: status.as_u16(),
            })
        }
    }
}
