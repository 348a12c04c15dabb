//! Alert delivery channels
//!
//! A channel makes exactly one delivery attempt per call. Retrying is the
//! dispatcher's job.

pub mod email;
pub mod webhook;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::models::Alert;

pub use email::EmailChannel;
pub use webhook::WebhookChannel;

/// One way of reaching an operator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Stable channel name used in delivery records
    fn name(&self) -> &str;

    /// Make a single delivery attempt
    async fn send_once(&self, alert: &Alert) -> Result<(), DeliveryError>;
}
