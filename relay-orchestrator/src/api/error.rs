//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::repository::StoreError;
use crate::service::OrchestratorError;
use crate::service::feedback::FeedbackError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Store(StoreError::NotFound(id)) => {
                ApiError::NotFound(format!("Run {} not found", id))
            }
            OrchestratorError::Store(other) => ApiError::Conflict(other.to_string()),
            OrchestratorError::NotFinished(_) | OrchestratorError::AlreadyTerminal(..) => {
                ApiError::Conflict(err.to_string())
            }
            OrchestratorError::InvalidWebhook(msg) => ApiError::BadRequest(msg),
            OrchestratorError::TicketsDisabled => ApiError::NotFound(err.to_string()),
            OrchestratorError::Ticket(e @ FeedbackError::NoDescription(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            OrchestratorError::Ticket(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
