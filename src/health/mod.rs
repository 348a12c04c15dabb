//! Source health tracking
//!
//! Each data source moves through `idle -> in_progress -> {success, failed}`
//! and back to `in_progress` on its next run. Consecutive failures lower a
//! 0-100 health score; one success restores it.

pub mod tracker;

pub use tracker::SourceHealthTracker;
