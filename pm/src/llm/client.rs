//! The seam between agents and the model provider

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Agents send the whole conversation (system prompt, task, context) on every
/// call; a client keeps nothing between requests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Cheap authenticated call used by `pm test`
    async fn check_connection(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records each request
    #[derive(Default)]
    pub struct MockLlmClient {
        queue: Mutex<VecDeque<CompletionResponse>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<CompletionResponse>) -> Self {
            Self {
                queue: Mutex::new(responses.into()),
                seen: Mutex::default(),
            }
        }

        /// One text response per call, in order
        pub fn with_text(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| CompletionResponse::text(*t)).collect())
        }

        pub fn call_count(&self) -> usize {
            self.seen.lock().map(|s| s.len()).unwrap_or(0)
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.seen.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request);
            }
            self.queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .ok_or_else(|| LlmError::InvalidResponse("mock script exhausted".to_string()))
        }
    }

    #[tokio::test]
    async fn test_mock_replays_in_order_then_fails() {
        let client = MockLlmClient::with_text(&["first"]);
        let request = CompletionRequest {
            system_prompt: "You are a Project Planner.".to_string(),
            messages: vec![crate::llm::Message::user("Plan it")],
            max_tokens: 100,
            temperature: None,
        };

        let first = client.complete(request.clone()).await.unwrap();
        assert_eq!(first.content.as_deref(), Some("first"));
        assert!(client.complete(request).await.is_err());
        assert_eq!(client.call_count(), 2);
        assert_eq!(client.requests()[1].messages[0].content, "Plan it");
    }
}
