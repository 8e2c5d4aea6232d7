//! Slack Web API / incoming-webhook client

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::blocks::{self, SprintMetrics, StandupContent};
use super::error::SlackError;
use crate::approval::ApprovalRequest;
use crate::config::SlackConfig;
use crate::github::RiskFlag;

/// Where a message ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: String,
    /// Message timestamp; absent for webhook posts
    pub ts: Option<String>,
}

#[derive(Debug, Clone)]
enum Transport {
    Bot { api_url: String, token: String },
    Webhook { url: String },
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SlackClient {
    http: Client,
    transport: Transport,
}

/// Channel name as the Web API expects it
pub fn normalize_channel(channel: &str) -> &str {
    channel.trim().trim_start_matches('#')
}

impl SlackClient {
    /// Prefer the bot token; fall back to the incoming webhook
    pub fn from_config(config: &SlackConfig) -> Result<Self, SlackError> {
        debug!(channel = %config.channel, "from_config: called");
        let token = std::env::var(&config.token_env).ok().filter(|t| !t.trim().is_empty());
        match (token, &config.webhook_url) {
            (Some(token), _) => Self::new(&config.api_url, token),
            (None, Some(url)) if !url.trim().is_empty() => Self::webhook(url),
            _ => Err(SlackError::NotConfigured(format!(
                "set {} or SLACK_WEBHOOK_URL",
                config.token_env
            ))),
        }
    }

    pub fn new(api_url: &str, token: impl Into<String>) -> Result<Self, SlackError> {
        Ok(Self {
            http: Self::http()?,
            transport: Transport::Bot {
                api_url: api_url.trim_end_matches('/').to_string(),
                token: token.into(),
            },
        })
    }

    pub fn webhook(url: &str) -> Result<Self, SlackError> {
        Ok(Self {
            http: Self::http()?,
            transport: Transport::Webhook { url: url.to_string() },
        })
    }

    fn http() -> Result<Client, SlackError> {
        Ok(Client::builder().timeout(Duration::from_secs(30)).build()?)
    }

    async fn call(&self, method: &str, body: &Value) -> Result<ApiResponse, SlackError> {
        let Transport::Bot { api_url, token } = &self.transport else {
            return Err(SlackError::NotConfigured(format!("{} needs a bot token", method)));
        };
        let response = self
            .http
            .post(format!("{}/{}", api_url, method))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SlackError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: ApiResponse = serde_json::from_str(&text)?;
        if !parsed.ok {
            return Err(SlackError::Api(parsed.error.unwrap_or_else(|| "unknown_error".to_string())));
        }
        Ok(parsed)
    }

    /// Post a message with optional blocks
    pub async fn send_message(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<Vec<Value>>,
    ) -> Result<PostedMessage, SlackError> {
        let channel = normalize_channel(channel);
        debug!(%channel, "send_message: called");

        let mut body = json!({ "channel": channel, "text": text });
        if let Some(blocks) = blocks {
            body["blocks"] = Value::Array(blocks);
        }

        match &self.transport {
            Transport::Bot { .. } => {
                let response = self.call("chat.postMessage", &body).await?;
                info!(%channel, "Posted Slack message");
                Ok(PostedMessage {
                    channel: response.channel.unwrap_or_else(|| channel.to_string()),
                    ts: response.ts,
                })
            }
            Transport::Webhook { url } => {
                let response = self.http.post(url).json(&body).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SlackError::Http {
                        status: status.as_u16(),
                        body: response.text().await.unwrap_or_default(),
                    });
                }
                info!(%channel, "Posted Slack message via webhook");
                Ok(PostedMessage {
                    channel: channel.to_string(),
                    ts: None,
                })
            }
        }
    }

    pub async fn post_daily_standup(
        &self,
        channel: &str,
        date: &str,
        content: &StandupContent<'_>,
    ) -> Result<PostedMessage, SlackError> {
        let blocks = blocks::standup(date, content);
        self.send_message(channel, &format!("Daily Standup - {}", date), Some(blocks))
            .await
    }

    pub async fn post_sprint_report(
        &self,
        channel: &str,
        name: &str,
        metrics: &SprintMetrics,
        completed: &[String],
        incomplete: &[String],
        retrospective: &[String],
    ) -> Result<PostedMessage, SlackError> {
        let blocks = blocks::sprint_report(name, metrics, completed, incomplete, retrospective);
        self.send_message(channel, &format!("Sprint Report: {}", name), Some(blocks))
            .await
    }

    /// Returns `None` without posting when there is nothing to report
    pub async fn notify_risk_flags(
        &self,
        channel: &str,
        flags: &[RiskFlag],
    ) -> Result<Option<PostedMessage>, SlackError> {
        if flags.is_empty() {
            debug!("notify_risk_flags: nothing to send");
            return Ok(None);
        }
        let blocks = blocks::risk_flags(flags);
        let posted = self
            .send_message(
                channel,
                &format!("Risk Flags Detected: {} total", flags.len()),
                Some(blocks),
            )
            .await?;
        Ok(Some(posted))
    }

    /// Post an approval request with approve/reject buttons
    pub async fn send_approval_request(
        &self,
        channel: &str,
        request: &ApprovalRequest,
        requester: &str,
    ) -> Result<PostedMessage, SlackError> {
        debug!(id = %request.id, action_type = %request.action_type, "send_approval_request: called");
        let blocks = blocks::approval_request(request, requester);
        self.send_message(
            channel,
            &format!("Approval Required: {}", request.action_type),
            Some(blocks),
        )
        .await
    }

    /// Verify credentials; returns a short identity string
    pub async fn auth_test(&self) -> Result<String, SlackError> {
        debug!("auth_test: called");
        match &self.transport {
            Transport::Bot { .. } => {
                let response = self.call("auth.test", &json!({})).await?;
                Ok(format!(
                    "{} @ {}",
                    response.user.unwrap_or_default(),
                    response.team.unwrap_or_default()
                ))
            }
            Transport::Webhook { .. } => Ok("incoming webhook (not verified)".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("#pm-updates"), "pm-updates");
        assert_eq!(normalize_channel(" general "), "general");
    }

    #[tokio::test]
    async fn test_send_message_strips_hash_and_sends_blocks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_header("authorization", "Bearer xoxb-test")
            .match_body(Matcher::PartialJson(json!({
                "channel": "pm-updates",
                "text": "Daily Standup - 2024-05-02",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"channel":"C123","ts":"1714600000.000100"}"#)
            .create_async()
            .await;

        let client = SlackClient::new(&server.url(), "xoxb-test").unwrap();
        let posted = client
            .post_daily_standup("#pm-updates", "2024-05-02", &StandupContent::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(posted.channel, "C123");
        assert_eq!(posted.ts.as_deref(), Some("1714600000.000100"));
    }

    #[tokio::test]
    async fn test_api_not_ok_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat.postMessage")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"channel_not_found"}"#)
            .create_async()
            .await;

        let client = SlackClient::new(&server.url(), "xoxb-test").unwrap();
        let err = client.send_message("nowhere", "hi", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Slack API error: channel_not_found");
    }

    #[tokio::test]
    async fn test_webhook_transport() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/abc")
            .match_body(Matcher::PartialJson(json!({ "text": "hello" })))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let client = SlackClient::webhook(&format!("{}/hooks/abc", server.url())).unwrap();
        let posted = client.send_message("#general", "hello", None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(posted.channel, "general");
        assert!(posted.ts.is_none());
        assert_eq!(client.auth_test().await.unwrap(), "incoming webhook (not verified)");
    }

    #[tokio::test]
    async fn test_notify_risk_flags_empty_does_not_post() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/chat.postMessage").expect(0).create_async().await;

        let client = SlackClient::new(&server.url(), "xoxb-test").unwrap();
        assert!(client.notify_risk_flags("pm", &[]).await.unwrap().is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_test() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth.test")
            .with_status(200)
            .with_body(r#"{"ok":true,"user":"pmbot","team":"Acme"}"#)
            .create_async()
            .await;

        let client = SlackClient::new(&server.url(), "xoxb-test").unwrap();
        assert_eq!(client.auth_test().await.unwrap(), "pmbot @ Acme");
    }

    #[tokio::test]
    async fn test_send_approval_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::PartialJson(json!({
                "channel": "approvals",
                "text": "Approval Required: github_trigger_workflow",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"channel":"C9","ts":"1.0"}"#)
            .create_async()
            .await;

        let request = ApprovalRequest::new(
            "github_trigger_workflow",
            "Deploy to production",
            serde_json::Map::new(),
            crate::approval::RiskLevel::High,
        );
        let client = SlackClient::new(&server.url(), "xoxb-test").unwrap();
        let posted = client
            .send_approval_request("#approvals", &request, "System Monitor")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(posted.channel, "C9");
    }
}
