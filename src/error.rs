use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error taxonomy for the session and grading engines. Every operation in
/// the logical interface resolves to one of these variants, and the HTTP
/// layer maps them uniformly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Operation not legal in the session's current status, e.g. answering
    /// after submission started.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("index out of range: {0}")]
    OutOfRange(String),

    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    /// Duplicate submit observed while a grading pass is in flight.
    #[error("submission already in progress for session {0}")]
    AlreadyInProgress(String),

    /// Grading invariant violation: the answers snapshot references a
    /// question id the exam does not contain. Signals a session engine bug.
    #[error("answer snapshot references unknown question {0}")]
    MismatchedQuestionSet(String),

    /// Result store write failed. Safe to retry via Submit.
    #[error("result store unavailable: {0}")]
    StoreUnavailable(String),

    /// Bounded wait on an in-flight submission expired.
    #[error("timed out waiting for session {0}")]
    Timeout(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl ApiError {
    /// Retryable errors are safe to resolve by re-invoking Submit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::StoreUnavailable(_) | ApiError::Timeout(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidState(_) | ApiError::AlreadyInProgress(_) => StatusCode::CONFLICT,
            ApiError::OutOfRange(_) | ApiError::UnknownQuestion(_) | ApiError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::MismatchedQuestionSet(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::MismatchedQuestionSet(ref detail) = self {
            // Invariant violation, not a user error. Must be visible in logs.
            tracing::error!("grading invariant violated: {}", detail);
        }

        let status = self.status_code();
        let body = Json(json!({
            "message": self.to_string(),
            "status": status.as_u16(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}
