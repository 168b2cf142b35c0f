//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use domain::{DomainError, ErrorKind};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client, rejected before reaching a service.
    BadRequest(String),
    /// Error returned by a domain service.
    Domain(DomainError),
}

impl ApiError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => match err.kind() {
                ErrorKind::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                ErrorKind::Conflict => (StatusCode::CONFLICT, err.to_string()),
                ErrorKind::Invalid => (StatusCode::BAD_REQUEST, err.to_string()),
                ErrorKind::Unexpected => {
                    tracing::error!(error = %err, "internal server error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Unexpected error".to_string(),
                    )
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        let body = serde_json::json!({
            "status": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": message,
            "timestamp": Utc::now(),
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}
