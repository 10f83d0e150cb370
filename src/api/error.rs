//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, error};

use crate::hash::IntegrityError;
use crate::metric::MetricError;
use crate::storage::StorageError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Metric kind in a raw path is neither gauge nor counter
    UnsupportedKind(String),

    /// Unparsable body or value, or an update rejected by the metric model
    InvalidRequest(String),

    /// Inbound hash does not match
    Integrity(String),

    /// No metric with this id (and kind)
    NotFound(String),

    /// Durable medium failed or is missing
    Storage(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::UnsupportedKind(msg) => (StatusCode::NOT_IMPLEMENTED, msg),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Integrity(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            error!("{status}: {error_message}");
        } else {
            debug!("{status}: {error_message}");
        }

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StorageError::Metric(e) => ApiError::InvalidRequest(e.to_string()),
            _ => ApiError::Storage(err.to_string()),
        }
    }
}

impl From<MetricError> for ApiError {
    fn from(err: MetricError) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

impl From<IntegrityError> for ApiError {
    fn from(err: IntegrityError) -> Self {
        ApiError::Integrity(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidRequest(format!("malformed JSON body: {err}"))
    }
}
