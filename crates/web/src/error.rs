//! Error handling with the `{success: false, error: {code, message}}` envelope

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("{0}")]
    NotFound(String),

    #[error("Reminder workflow is not configured")]
    WorkflowNotConfigured,

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::WorkflowNotConfigured | AppError::ServiceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::WorkflowNotConfigured => "WORKFLOW_NOT_CONFIGURED",
            other => fallback_code(other.status_code()),
        }
    }
}

/// Default code for a status when the error carries none of its own.
pub fn fallback_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "BAD_REQUEST",
        StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
        StatusCode::FORBIDDEN => "FORBIDDEN",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::CONFLICT => "CONFLICT",
        StatusCode::TOO_MANY_REQUESTS => "TOO_MANY_REQUESTS",
        StatusCode::SERVICE_UNAVAILABLE => "SERVICE_UNAVAILABLE",
        _ => "INTERNAL_SERVER_ERROR",
    }
}

impl From<subtrack_core::Error> for AppError {
    fn from(err: subtrack_core::Error) -> Self {
        match err {
            subtrack_core::Error::Validation { messages } => AppError::Validation(messages),
            subtrack_core::Error::InvalidFrequency { .. }
            | subtrack_core::Error::InvalidEnum { .. } => AppError::Validation(vec![err.to_string()]),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<subtrack_reminders::Error> for AppError {
    fn from(err: subtrack_reminders::Error) -> Self {
        match err {
            subtrack_reminders::Error::TriggerNotConfigured => AppError::WorkflowNotConfigured,
            subtrack_reminders::Error::TriggerFailed { reason } => {
                AppError::ServiceUnavailable(reason)
            }
            subtrack_reminders::Error::Core(core) => core.into(),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    code: &'static str,
    message: String,
}

/// Failure envelope
#[derive(Serialize)]
pub struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

impl ErrorResponse {
    pub fn from_error(err: &AppError) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: err.code(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }
        (status, Json(ErrorResponse::from_error(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_are_joined() {
        let err = AppError::from(subtrack_core::Error::validation([
            "Subscription price is required",
            "Payment method is required",
        ]));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(
            err.to_string(),
            "Subscription price is required, Payment method is required"
        );
    }

    #[test]
    fn test_unconfigured_trigger_maps_to_503() {
        let err = AppError::from(subtrack_reminders::Error::TriggerNotConfigured);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "WORKFLOW_NOT_CONFIGURED");
    }

    #[test]
    fn test_storage_failure_is_internal() {
        let err = AppError::from(subtrack_reminders::Error::storage_failed("save", "disk full"));
        assert_eq!(err.code(), "INTERNAL_SERVER_ERROR");
    }

    #[test]
    fn test_fallback_codes() {
        assert_eq!(fallback_code(StatusCode::FORBIDDEN), "FORBIDDEN");
        assert_eq!(fallback_code(StatusCode::TOO_MANY_REQUESTS), "TOO_MANY_REQUESTS");
        assert_eq!(fallback_code(StatusCode::IM_A_TEAPOT), "INTERNAL_SERVER_ERROR");
    }
}
