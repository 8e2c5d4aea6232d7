//! LLM-backed agents
//!
//! An [`Agent`] is a role (goal, backstory, tools) bound to an LLM client. The
//! planner, reporter and monitor wrap one each and turn GitHub data into
//! task prompts; none of them writes anywhere.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::llm::{CompletionRequest, LlmClient, LlmError, Message};
use crate::prompts::PromptLoader;

mod monitor;
mod planner;
mod reporter;

pub use monitor::MonitorAgent;
pub use planner::{PlanDraft, PlannerAgent, extract_json_block, parse_issue_drafts};
pub use reporter::{ReporterAgent, SprintReport, StandupReport};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{agent} failed: {source}")]
    Llm {
        agent: String,
        #[source]
        source: LlmError,
    },

    #[error("{agent} did not finish within {after:?}")]
    Timeout { agent: String, after: Duration },

    #[error("{agent} returned an empty response")]
    EmptyResponse { agent: String },

    #[error("prompt error: {0}")]
    Prompt(String),
}

/// Static description of an agent role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentProfile {
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub tools: &'static [&'static str],
}

/// Per-call limits shared by all agents
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// `None` lets a call run as long as the client allows
    pub max_execution_time: Option<Duration>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: Some(0.7),
            max_execution_time: Some(Duration::from_secs(300)),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_tokens: config.llm.max_tokens,
            temperature: Some(config.llm.temperature),
            max_execution_time: config.agent.max_execution_time(),
        }
    }
}

/// What an agent said
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub agent: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

pub struct Agent {
    profile: AgentProfile,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    settings: AgentSettings,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.profile.role)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Agent {
    pub fn new(
        profile: AgentProfile,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLoader>,
        settings: AgentSettings,
    ) -> Self {
        debug!(role = %profile.role, "Agent::new: called");
        Self {
            profile,
            llm,
            prompts,
            settings,
        }
    }

    pub fn role(&self) -> &'static str {
        self.profile.role
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Render a task template, mapping failures to [`AgentError::Prompt`]
    pub(crate) fn render(&self, template: &str, context: &Value) -> Result<String, AgentError> {
        self.prompts
            .render(template, context)
            .map_err(|e| AgentError::Prompt(e.to_string()))
    }

    /// System prompt built from the role
    pub fn system_prompt(&self) -> Result<String, AgentError> {
        self.render(
            "system",
            &json!({
                "role": self.profile.role,
                "goal": self.profile.goal,
                "backstory": self.profile.backstory,
                "tools": self.profile.tools,
            }),
        )
    }

    /// Run one task; `context` goes out as a second user message
    pub async fn execute_task(
        &self,
        task: &str,
        context: Option<&Map<String, Value>>,
    ) -> Result<AgentOutput, AgentError> {
        let role = self.profile.role;
        debug!(%role, task_len = task.len(), has_context = context.is_some(), "execute_task: called");

        let mut messages = vec![Message::user(task)];
        if let Some(ctx) = context.filter(|c| !c.is_empty()) {
            let rendered = serde_json::to_string_pretty(ctx).unwrap_or_default();
            messages.push(Message::user(format!("Additional context: {}", rendered)));
        }

        let request = CompletionRequest {
            system_prompt: self.system_prompt()?,
            messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let call = self.llm.complete(request);
        let result = match self.settings.max_execution_time {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(%role, ?limit, "execute_task: timed out");
                    return Err(AgentError::Timeout {
                        agent: role.to_string(),
                        after: limit,
                    });
                }
            },
            None => call.await,
        };
        let response = result.map_err(|source| AgentError::Llm {
            agent: role.to_string(),
            source,
        })?;

        let text = response
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AgentError::EmptyResponse { agent: role.to_string() })?;

        info!(%role, usage_in = response.usage.input_tokens, usage_out = response.usage.output_tokens, "Agent task complete");
        Ok(AgentOutput {
            agent: role.to_string(),
            response: text,
            timestamp: Utc::now(),
        })
    }
}

/// Summary of one agent for status displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub role: String,
    pub goal: String,
    pub tools: Vec<String>,
}

impl From<&AgentProfile> for AgentSummary {
    fn from(profile: &AgentProfile) -> Self {
        Self {
            role: profile.role.to_string(),
            goal: profile.goal.to_string(),
            tools: profile.tools.iter().map(|t| t.to_string()).collect(),
        }
    }
}
