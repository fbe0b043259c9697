//! # Handlers
//!
//! Thin adapters between axum extractors and the services. Each handler
//! derives a [`RequestContext`] from the configured timeout; dropping the
//! handler future (client gone) drops the storage call with it.

use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::{DomainError, MediaUpload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use services::RequestContext;
use tracing::{instrument, warn};

use super::error::{status_for, ApiError};
use super::AppState;
use crate::graph::{GraphRequest, GraphResponse};
use crate::metrics;

/// Multipart field carrying the upload.
pub const IMAGE_FIELD: &str = "image";

// ── Graph ───────────────────────────────────────────────────────────────────

/// `POST /api/v1/graphql`. Per-operation failures still answer 200; only a
/// body or document that cannot be read at all gets a 400.
#[instrument(skip_all)]
pub async fn graphql(State(state): State<AppState>, body: Bytes) -> Response {
    let request = serde_json::from_slice::<Value>(&body)
        .map_err(|e| DomainError::invalid(format!("malformed JSON body: {e}")))
        .and_then(GraphRequest::from_json);
    let request = match request {
        Ok(request) => request,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, Json(GraphResponse::request_error(err))).into_response();
        }
    };

    let ctx = RequestContext::with_timeout(state.request_timeout);
    let response = state.executor.execute(&ctx, request).await;
    state.metrics.record_graph(&response.outcomes);

    let status = if response.is_request_error() { StatusCode::BAD_REQUEST } else { StatusCode::OK };
    (status, Json(response)).into_response()
}

// ── Media ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub url: String,
    pub size: u64,
}

/// `POST /api/v1/media` with a single multipart field named `image`.
#[instrument(skip_all)]
pub async fn upload_media(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let upload = match read_image(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            state.metrics.record_upload("invalid");
            return ApiError::new(StatusCode::BAD_REQUEST, "No file uploaded").into_response();
        }
        Err(err) => {
            state.metrics.record_upload("invalid");
            warn!(error = %err, "unreadable multipart body");
            return ApiError::new(err.status(), err.body_text()).into_response();
        }
    };

    let ctx = RequestContext::with_timeout(state.request_timeout);
    match state.media.ingest(&ctx, upload).await {
        Ok(object) => {
            state.metrics.record_upload("ok");
            Json(UploadResponse { filename: object.name, url: object.url, size: object.size }).into_response()
        }
        Err(err @ DomainError::Invalid(_)) => {
            state.metrics.record_upload("invalid");
            ApiError::from(err).into_response()
        }
        Err(err) => {
            state.metrics.record_upload(err.kind().code());
            ApiError::new(status_for(err.kind()), "Upload failed").into_response()
        }
    }
}

/// Reads fields until `image` turns up. Other fields are skipped.
async fn read_image(multipart: &mut Multipart) -> Result<Option<MediaUpload>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            return into_upload(field).await.map(Some);
        }
    }
    Ok(None)
}

async fn into_upload(field: Field<'_>) -> Result<MediaUpload, MultipartError> {
    let original_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let data = field.bytes().await?;
    Ok(MediaUpload { original_name, content_type, data })
}

#[derive(Debug, Deserialize)]
pub struct SignedLink {
    expires: Option<i64>,
    signature: Option<String>,
}

/// `GET /api/v1/media/{name}?expires=..&signature=..`, served only when the
/// configured store signs its own links.
#[instrument(skip(state, link))]
pub async fn fetch_media(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(link): Query<SignedLink>,
) -> Response {
    let Some(reader) = state.media_reader.clone() else {
        return ApiError::new(StatusCode::NOT_FOUND, "not found").into_response();
    };
    let (Some(expires), Some(signature)) = (link.expires, link.signature) else {
        return forbidden();
    };

    let ctx = RequestContext::with_timeout(state.request_timeout);
    match ctx.run(reader.open_signed(&name, expires, &signature)).await {
        Ok(object) => (
            [
                (header::CONTENT_TYPE, object.content_type),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            ],
            object.data,
        )
            .into_response(),
        Err(DomainError::Invalid(_)) => forbidden(),
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn forbidden() -> Response {
    ApiError::new(StatusCode::FORBIDDEN, "invalid or expired link").into_response()
}

// ── Operational ─────────────────────────────────────────────────────────────

/// `GET /api/v1/ping`
pub async fn ping() -> StatusCode {
    StatusCode::OK
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics::CONTENT_TYPE)], body).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
