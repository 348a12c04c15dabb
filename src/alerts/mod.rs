//! Alert delivery
//!
//! - [`dedup`]: content fingerprint used to suppress repeated alerts
//! - [`channels`]: webhook and SMTP channels, one attempt per call
//! - [`dispatcher`]: per-channel retry, at-least-one delivery
//! - [`service`]: dedup lookup, dispatch and audit in one call

pub mod channels;
pub mod dedup;
pub mod dispatcher;
pub mod service;

pub use channels::{AlertChannel, EmailChannel, WebhookChannel};
pub use dedup::{dedup_hash, normalize_message};
pub use dispatcher::{AlertDispatcher, ChannelRoute};
pub use service::{AlertOutcome, AlertService, DeliveryStats};
