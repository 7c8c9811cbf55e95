use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::store::StoreError;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Malformed or contradictory filter/sort/page/interval input.
    /// Raised before any storage access; never retried.
    InvalidFilter { field: &'static str, message: String },
    /// Requested record does not exist
    NotFound(String),
    /// A storage read failed; the caller may retry
    StorageUnavailable(String),
    /// Internal server error
    Internal(String),
}

impl AppError {
    pub fn invalid_filter(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFilter { field, message } => {
                write!(f, "Invalid filter ({}): {}", field, message)
            }
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidFilter { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            Self::InvalidFilter { field, message } => Json(json!({
                "error": {
                    "type": "invalid_filter",
                    "field": field,
                    "message": message,
                }
            })),
            Self::StorageUnavailable(message) => Json(json!({
                "error": {
                    "type": "storage_unavailable",
                    "message": message,
                    "retryable": true,
                }
            })),
            _ => Json(json!({
                "error": {
                    "type": error_type_name(&self),
                    "message": self.to_string(),
                }
            })),
        };

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::InvalidFilter { .. } => "invalid_filter",
        AppError::NotFound(_) => "not_found",
        AppError::StorageUnavailable(_) => "storage_unavailable",
        AppError::Internal(_) => "internal_error",
    }
}

// A failed storage read surfaces to one-shot callers as a retryable failure.
// Stream ticks handle StoreError themselves and never convert through here.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
