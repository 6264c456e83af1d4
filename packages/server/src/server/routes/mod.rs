// HTTP routes
pub mod health;
pub mod progress;
pub mod videos;

pub use health::*;
pub use progress::*;
pub use videos::*;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use media_pipeline::{truncate_error, PipelineError};

/// Structured error body returned to clients: `{error, details?}` with
/// the underlying cause bounded so oversized vendor payloads never leak.
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": self.error,
            "details": self.details,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::JobNotFound { .. } => StatusCode::NOT_FOUND,
            PipelineError::Precondition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Cancelled { .. }
            | PipelineError::WrongStatus { .. }
            | PipelineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            PipelineError::Provider(_) | PipelineError::Blob(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: truncate_error(&err.to_string()),
            details: None,
        }
    }
}
