//! GitHub client errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub not configured: {0}")]
    NotConfigured(String),

    #[error("GitHub API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("GitHub GraphQL error: {0}")]
    GraphQl(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GitHubError {
    /// Extract GitHub's `message` field from an error body when present
    pub(crate) fn api(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.to_string());
        GitHubError::Api { status, message }
    }
}
