//! # api-adapters
//!
//! Inbound side of the service: the query resolution layer (`graph`),
//! Prometheus counters, and, behind `web-axum`, the HTTP transport.

pub mod graph;
pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod http;

pub use graph::{Executor, GraphRequest, GraphResponse, Schema};
pub use metrics::Metrics;

#[cfg(feature = "web-axum")]
pub use http::{router, AppState};
