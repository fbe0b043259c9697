//! # HTTP transport (axum)
//!
//! Routes, mounted under `/api/v1` except for `/metrics`:
//! - `POST /graphql`       query/mutation documents
//! - `POST /media`         multipart image upload
//! - `GET  /media/{name}`  signed retrieval for self-signing stores
//! - `GET  /ping`          liveness

pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use domains::SignedObjectReader;
use services::MediaService;

use crate::graph::Executor;
use crate::metrics::Metrics;

/// Headroom above the upload cap for multipart boundaries and headers.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
    pub media: Arc<MediaService>,
    /// Set when the media store serves its own signed links.
    pub media_reader: Option<Arc<dyn SignedObjectReader>>,
    pub metrics: Arc<Metrics>,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes + MULTIPART_OVERHEAD);

    let api = Router::new()
        .route("/graphql", post(handlers::graphql))
        .route("/media", post(handlers::upload_media).layer(upload_limit))
        .route("/media/{name}", get(handlers::fetch_media))
        .route("/ping", get(handlers::ping));

    Router::new()
        .nest("/api/v1", api)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::cors_policy())
        .layer(middleware::request_tracing())
        .with_state(state)
}
