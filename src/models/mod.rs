//! Domain models for syncwarden
//!
//! This module contains the persisted and exchanged types shared by the sync
//! path and the alert path.

pub mod alert;
pub mod health;

// Re-export commonly used types
pub use alert::{Alert, AlertDeliveryAudit, DeliveryRecord, DispatchReport, Priority};
pub use health::{SourceHealthRecord, SyncStatus};
