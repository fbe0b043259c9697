//! Shared harness for the end-to-end tests: the full axum router over an
//! in-memory SQLite database and a temp-dir media store.

#![cfg(feature = "web-axum")]

use std::sync::Arc;
use std::time::Duration;

use api_adapters::{router, AppState, Executor, Metrics, Schema};
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use domains::{MediaStorage, SignedObjectReader};
use secrecy::SecretString;
use serde_json::{json, Value};
use services::{ContentService, MediaService, SubmitterHasher};
use sqlx::SqlitePool;
use storage_adapters::{LocalMediaStore, SqliteContentRepository};
use tempfile::TempDir;
use tower::ServiceExt;

/// Public prefix the test media store signs links under.
pub const MEDIA_BASE_URL: &str = "http://forum.test/api/v1/media";
pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;
/// Key the test media store signs retrieval links with.
pub const MEDIA_SIGNING_KEY: &str = "integration-signing-key";
const BOUNDARY: &str = "forum-test-boundary";

pub struct TestApp {
    pub router: Router,
    /// Direct handle on the database for assertions on stored rows.
    pub pool: SqlitePool,
    _media_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let media_dir = tempfile::tempdir().expect("temp dir");
        let local = Arc::new(LocalMediaStore::new(
            media_dir.path().join("media"),
            MEDIA_BASE_URL,
            SecretString::from(MEDIA_SIGNING_KEY.to_string()),
        ));
        let store: Arc<dyn MediaStorage> = local.clone();
        let reader: Arc<dyn SignedObjectReader> = local;
        Self::assemble(store, Some(reader), media_dir).await
    }

    /// The same app over a caller-supplied media store with no retrieval route.
    pub async fn with_media_store(store: Arc<dyn MediaStorage>) -> Self {
        let media_dir = tempfile::tempdir().expect("temp dir");
        Self::assemble(store, None, media_dir).await
    }

    async fn assemble(
        store: Arc<dyn MediaStorage>,
        reader: Option<Arc<dyn SignedObjectReader>>,
        media_dir: TempDir,
    ) -> Self {
        let repo = SqliteContentRepository::in_memory().await.expect("in-memory sqlite");
        let pool = repo.pool().clone();

        let hasher = SubmitterHasher::new(SecretString::from("integration-salt".to_string()));
        let content = Arc::new(ContentService::new(Arc::new(repo), hasher));

        let state = AppState {
            executor: Arc::new(Executor::new(Arc::new(Schema::forum()), content)),
            media: Arc::new(MediaService::new(store, MAX_UPLOAD_BYTES)),
            media_reader: reader,
            metrics: Arc::new(Metrics::new()),
            request_timeout: Duration::from_secs(5),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        };

        Self { router: router(state), pool, _media_dir: media_dir }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("readable body");
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Bytes) {
        self.send(Request::get(uri).body(Body::empty()).expect("request")).await
    }

    /// Like [`TestApp::get`], keeping the response headers.
    pub async fn fetch(&self, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let request = Request::get(uri).body(Body::empty()).expect("request");
        let response = self.router.clone().oneshot(request).await.expect("router is infallible");
        let (parts, body) = response.into_parts();
        let body = to_bytes(body, usize::MAX).await.expect("readable body");
        (parts.status, parts.headers, body)
    }

    /// POSTs a raw body to the graph endpoint.
    pub async fn post_graph_raw(&self, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::post("/api/v1/graphql")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("request");
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).expect("graph responses are JSON"))
    }

    pub async fn graph(&self, query: &str, variables: Value) -> (StatusCode, Value) {
        let body = json!({ "query": query, "variables": variables }).to_string();
        self.post_graph_raw(body).await
    }

    /// Runs a query that must succeed and returns its `data` object.
    pub async fn data(&self, query: &str, variables: Value) -> Value {
        let (status, body) = self.graph(query, variables).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body.get("errors").is_none(), "unexpected errors: {body}");
        body["data"].clone()
    }

    /// Uploads `data` as the multipart field `field`.
    pub async fn upload(&self, field: &str, filename: &str, content_type: &str, data: &[u8]) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n").as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post("/api/v1/media")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .expect("request");
        let (status, bytes) = self.send(request).await;
        (status, serde_json::from_slice(&bytes).expect("upload responses are JSON"))
    }
}
