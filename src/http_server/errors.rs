//! # HTTP API Errors
//!
//! Every failure leaves the service as `{"error": <message>, "code": <STORAGE_*>}`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::collection::CollectionError;
use crate::executor::SearchError;
use crate::observability::{log_event_with_fields, Event};
use crate::query::QueryError;

/// Result type for route handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Body is not valid JSON or does not have the expected shape
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Query string is malformed or misses a required parameter
    #[error("Invalid query parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid query: {0}")]
    Query(#[from] QueryError),

    // ==================
    // Engine / storage errors
    // ==================
    #[error("{0}")]
    Search(#[from] SearchError),

    #[error("{0}")]
    Collection(#[from] CollectionError),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(_) | ApiError::InvalidParams(_) | ApiError::Query(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Search(err) => match err {
                SearchError::Expression(_) | SearchError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
                SearchError::JoinResolution { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SearchError::CollectionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                SearchError::Collection(err) => collection_status(err),
            },
            ApiError::Collection(err) => collection_status(err),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidBody(_) | ApiError::InvalidParams(_) => "STORAGE_INVALID_REQUEST",
            ApiError::Query(err) => err.code(),
            ApiError::Search(err) => err.code(),
            ApiError::Collection(err) => err.code(),
        }
    }
}

fn collection_status(err: &CollectionError) -> StatusCode {
    if err.is_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidParams(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };
        let status_text = status.as_u16().to_string();
        log_event_with_fields(
            Event::RequestFailed,
            &[("status", &status_text), ("code", body.code), ("error", &body.error)],
        );
        (status, Json(body)).into_response()
    }
}
