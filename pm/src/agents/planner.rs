//! Planner: project brief to issue drafts

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Agent, AgentError, AgentOutput, AgentProfile, AgentSettings};
use crate::config::ProjectContext;
use crate::github::CreateIssueParams;
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;

pub const PROFILE: AgentProfile = AgentProfile {
    role: "Project Planner",
    goal: "Transform project briefs and feature requests into well-structured epics, stories, and tasks \
           with clear acceptance criteria and estimates. Break down complex requirements into manageable work items.",
    backstory: "You are an experienced technical project manager with expertise in agile methodologies. \
                You excel at taking high-level requirements and breaking them down into concrete, actionable tasks. \
                You understand software development workflows and can estimate complexity accurately.",
    tools: &["create_issue", "search_issues", "send_message"],
};

/// The planner's proposal: narrative plus parsed issue drafts
#[derive(Debug, Clone)]
pub struct PlanDraft {
    pub output: AgentOutput,
    pub issues: Vec<CreateIssueParams>,
    /// Entries that could not be turned into an issue, with the reason
    pub skipped: Vec<String>,
}

impl PlanDraft {
    /// Narrative without the trailing JSON block
    pub fn summary(&self) -> &str {
        let text = self.output.response.as_str();
        match text.find("```json") {
            Some(idx) => text[..idx].trim_end(),
            None => text.trim_end(),
        }
    }
}

#[derive(Debug)]
pub struct PlannerAgent {
    agent: Agent,
}

impl PlannerAgent {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, settings: AgentSettings) -> Self {
        Self {
            agent: Agent::new(PROFILE, llm, prompts, settings),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Break a brief into issue drafts
    pub async fn plan_project(&self, brief: &str, project: &ProjectContext) -> Result<PlanDraft, AgentError> {
        debug!(brief_len = brief.len(), "plan_project: called");
        let task = self.agent.render(
            "plan",
            &json!({
                "brief": brief,
                "project_name": project.project_name,
                "repository": project.repository,
                "team_members": project.team_members,
            }),
        )?;

        let output = self.agent.execute_task(&task, Some(&project.to_map())).await?;
        let (issues, skipped) = parse_issue_drafts(&output.response, &project.team_members);
        if !skipped.is_empty() {
            warn!(count = skipped.len(), "plan_project: some issue drafts were skipped");
        }
        debug!(issues = issues.len(), "plan_project: parsed drafts");
        Ok(PlanDraft { output, issues, skipped })
    }
}

/// Locate the JSON payload in a model response
///
/// Prefers a ```json fenced block; falls back to the outermost `[...]`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse issue drafts, dropping assignees outside the team
///
/// An empty `team` accepts any assignee.
pub fn parse_issue_drafts(text: &str, team: &[String]) -> (Vec<CreateIssueParams>, Vec<String>) {
    let mut issues = Vec::new();
    let mut skipped = Vec::new();

    let Some(block) = extract_json_block(text) else {
        skipped.push("no issue list found in the response".to_string());
        return (issues, skipped);
    };
    let entries = match serde_json::from_str::<Value>(block) {
        Ok(Value::Array(entries)) => entries,
        Ok(other) => {
            skipped.push(format!("expected a JSON array, got {}", kind_of(&other)));
            return (issues, skipped);
        }
        Err(e) => {
            skipped.push(format!("issue list is not valid JSON: {}", e));
            return (issues, skipped);
        }
    };

    for (idx, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<CreateIssueParams>(entry) {
            Ok(mut params) if !params.title.trim().is_empty() => {
                if !team.is_empty() {
                    params.assignees.retain(|a| team.iter().any(|m| m.eq_ignore_ascii_case(a)));
                }
                issues.push(params);
            }
            Ok(_) => skipped.push(format!("entry {}: missing title", idx + 1)),
            Err(e) => skipped.push(format!("entry {}: {}", idx + 1, e)),
        }
    }
    (issues, skipped)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
