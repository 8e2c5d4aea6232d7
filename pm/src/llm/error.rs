//! OpenAI client errors

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OpenAI rate limit reached, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("OpenAI API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("OpenAI request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0} is not set")]
    MissingApiKey(String),

    #[error("Unexpected OpenAI response: {0}")]
    InvalidResponse(String),

    #[error("OpenAI did not answer within {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl LlmError {
    /// Build an API error from a non-success response
    ///
    /// OpenAI wraps failures as `{"error": {"message": ...}}`; anything else is kept verbatim.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| body.trim().to_string());
        LlmError::ApiError { status, message }
    }

    /// Worth another attempt with backoff
    ///
    /// Rate limits carry their own delay and are handed back to the caller instead.
    pub fn should_retry(&self) -> bool {
        match self {
            LlmError::ApiError { status, .. } => *status == 408 || *status >= 500,
            LlmError::Network(_) | LlmError::Timeout(_) => true,
            LlmError::RateLimited { .. }
            | LlmError::MissingApiKey(_)
            | LlmError::InvalidResponse(_)
            | LlmError::Json(_) => false,
        }
    }
}
