use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Failures surfaced by the store, the session bridge and the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Blank identifiers or content, or text over the size limit
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conversation not found: {0}")]
    NotFound(String),

    /// Non-zero exit or unparseable output from the assistant CLI
    #[error("assistant process failed: {0}")]
    ProcessFailure(String),

    #[error("assistant process timed out after {0:?}")]
    Timeout(Duration),
}

impl ChatError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn process_failure(msg: impl Into<String>) -> Self {
        Self::ProcessFailure(msg.into())
    }

    fn label(&self) -> &'static str {
        match self {
            ChatError::InvalidInput(_) => "invalid_input",
            ChatError::NotFound(_) => "not_found",
            ChatError::ProcessFailure(_) => "process_failure",
            ChatError::Timeout(_) => "timeout",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::ProcessFailure(_) => StatusCode::BAD_GATEWAY,
            ChatError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(serde_json::json!({
                "error": self.label(),
                "details": self.to_string(),
            })),
        )
            .into_response()
    }
}
