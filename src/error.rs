use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

static HIDE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Replace 5xx messages with an opaque one (production); details still go to the log
pub fn hide_internal_errors(hide: bool) {
    HIDE_INTERNAL_ERRORS.store(hide, Ordering::Relaxed);
}

/// Main application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Synthesis failed: {message}")]
    SynthesisFailed { message: String, failed: Vec<usize> },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String, failed: Vec<usize> },

    #[error("External service error: {message}")]
    ExternalService { message: String, failed: Vec<usize> },

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response structure: message, plus failed segment indices when relevant
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<usize>>,
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::SynthesisFailed { .. } | Self::ExternalService { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let failed = match self {
            Self::SynthesisFailed { failed, .. }
            | Self::ServiceUnavailable { failed, .. }
            | Self::ExternalService { failed, .. } => Some(failed.clone()),
            _ => None,
        };
        let message = if self.status_code().is_server_error() && HIDE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        ErrorResponse { message, failed }
    }
}

/// Implement IntoResponse for automatic conversion in handlers
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = %status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, status = %status.as_u16(), "Request rejected");
        }

        (status, Json(self.to_response())).into_response()
    }
}

/// Custom result type for the application
pub type AppResult<T> = Result<T, AppError>;
