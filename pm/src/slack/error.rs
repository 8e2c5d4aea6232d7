//! Slack client errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("Slack not configured: {0}")]
    NotConfigured(String),

    /// `ok: false` from the Web API
    #[error("Slack API error: {0}")]
    Api(String),

    #[error("Slack HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
