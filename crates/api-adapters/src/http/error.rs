//! HTTP mapping for [`DomainError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::{DomainError, ErrorKind};
use serde_json::json;

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unavailable | ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"error": "<message>"}` with a status derived from the error kind.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let message = match &err {
            DomainError::Invalid(msg) => msg.clone(),
            DomainError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self { status: status_for(err.kind()), message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (DomainError::invalid("x"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("board", 1), StatusCode::NOT_FOUND),
            (DomainError::Conflict("x".into()), StatusCode::CONFLICT),
            (DomainError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::Cancelled, StatusCode::SERVICE_UNAVAILABLE),
            (DomainError::DeadlineExceeded(Duration::from_secs(5)), StatusCode::GATEWAY_TIMEOUT),
            (DomainError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = ApiError::from(DomainError::Internal("db file at /var/lib/x".into()));
        assert_eq!(err.message, "internal error");
        let err = ApiError::from(DomainError::invalid("invalid file type"));
        assert_eq!(err.message, "invalid file type");
    }
}
