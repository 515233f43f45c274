//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::template::TemplateError;
use crate::workflow::WorkflowError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{message}")]
    Conflict { code: &'static str, message: String },
    #[error("Upload too large: {0}")]
    TooLarge(String),
    #[error("Unprocessable document: {0}")]
    Unprocessable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            ApiError::TooLarge(detail) => (StatusCode::PAYLOAD_TOO_LARGE, "TOO_LARGE", detail),
            ApiError::Unprocessable(detail) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE", detail)
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::InvalidTransition { .. } | WorkflowError::NotAtFinalReview(_) => {
                ApiError::Conflict {
                    code: "INVALID_TRANSITION",
                    message,
                }
            }
            WorkflowError::Blocked(_) => ApiError::Conflict {
                code: "BLOCKED",
                message,
            },
            WorkflowError::ConfirmationRequired => ApiError::Conflict {
                code: "CONFIRMATION_REQUIRED",
                message,
            },
            WorkflowError::StaleResult { .. } => ApiError::Conflict {
                code: "STALE_RESULT",
                message,
            },
            WorkflowError::Path(_) => ApiError::BadRequest(message),
            WorkflowError::Database(_) | WorkflowError::LockPoisoned => ApiError::Internal(message),
        }
    }
}

impl From<TemplateError> for ApiError {
    fn from(err: TemplateError) -> Self {
        let message = err.to_string();
        match err {
            TemplateError::UnsupportedFormat(_) | TemplateError::Malformed(_) => {
                ApiError::Unprocessable(message)
            }
            TemplateError::UnknownField(_) | TemplateError::UnknownDataPath(_) => {
                ApiError::BadRequest(message)
            }
            TemplateError::NotFound(_) => ApiError::NotFound(message),
            TemplateError::FillFailed(_) | TemplateError::Database(_) => ApiError::Internal(message),
        }
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        let message = err.to_string();
        match err {
            ExtractionError::TooLarge { .. } => ApiError::TooLarge(message),
            _ => ApiError::Unprocessable(message),
        }
    }
}
