//! Error-to-response mapping for the REST layer.
//!
//! Every error body is `{"detail": <message>}`. Internal failures are logged
//! with their cause and surfaced opaquely.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Errors a handler can surface to a client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 404: unknown target/schedule/run.
    #[error("{0}")]
    NotFound(String),

    /// 400: semantic validation failure or invalid state transition.
    #[error("{0}")]
    Validation(String),

    /// 422: request body failed to parse into its schema.
    #[error("{0}")]
    InvalidBody(String),

    /// 500: anything the client cannot act on.
    #[error("internal server error")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::TargetNotFound(_) => ApiError::NotFound("Target not found".to_string()),
            StoreError::ScheduleNotFound(_) => {
                ApiError::NotFound("Schedule not found".to_string())
            }
            StoreError::RunNotFound(_) => ApiError::NotFound("Run not found".to_string()),
            StoreError::InvalidTransition(message) => ApiError::Validation(message),
            StoreError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(cause) => {
                error!(error = %cause, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let detail = self.to_string();
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
