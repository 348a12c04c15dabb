//! Connector implementations
//!
//! Source-specific integrations live outside this crate; the HTTP connector
//! covers sources that expose JSON over HTTP with a time-window query.

pub mod http;

pub use http::HttpConnector;
