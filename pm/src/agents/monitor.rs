//! Monitor: health and risk assessments

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::{Agent, AgentError, AgentOutput, AgentProfile, AgentSettings};
use crate::config::ProjectContext;
use crate::github::{HealthReport, RiskFlag, WorkflowRun};
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;

pub const PROFILE: AgentProfile = AgentProfile {
    role: "System Monitor",
    goal: "Monitor CI/CD pipelines, code quality metrics, and system health. Proactively identify and \
           alert on potential issues, failures, and risks before they impact the team.",
    backstory: "You are a vigilant system administrator with deep experience in DevOps and monitoring. \
                You have an eye for patterns that indicate trouble and can quickly escalate issues to \
                the right people with actionable information.",
    tools: &["scan_for_risk_flags", "get_repository_stats", "send_message"],
};

fn describe_flag(flag: &RiskFlag) -> String {
    let mut line = format!("[{}] {}: {}", flag.severity, flag.kind, flag.description);
    if !flag.source_url.is_empty() {
        line.push_str(&format!(" ({})", flag.source_url));
    }
    line
}

fn describe_run(run: &WorkflowRun) -> String {
    format!(
        "{} on {} @ {}: {} / {}",
        run.name,
        run.head_branch,
        run.head_sha,
        run.status,
        run.conclusion.as_deref().unwrap_or("pending")
    )
}

#[derive(Debug)]
pub struct MonitorAgent {
    agent: Agent,
}

impl MonitorAgent {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, settings: AgentSettings) -> Self {
        Self {
            agent: Agent::new(PROFILE, llm, prompts, settings),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Prioritized assessment of repository health and open risks
    pub async fn perform_health_check(
        &self,
        health: &HealthReport,
        flags: &[RiskFlag],
        project: &ProjectContext,
    ) -> Result<AgentOutput, AgentError> {
        debug!(score = health.score, flags = flags.len(), "perform_health_check: called");
        let task = self.agent.render(
            "health-check",
            &json!({
                "repository": project.repository,
                "score": health.score,
                "assessment": health.assessment.to_string(),
                "failures": health.recent_workflow_failures,
                "critical_issues": health.open_critical_issues,
                "runs": health.recent_runs.iter().map(describe_run).collect::<Vec<_>>(),
                "flags": flags.iter().map(describe_flag).collect::<Vec<_>>(),
            }),
        )?;
        self.agent.execute_task(&task, Some(&project.to_map())).await
    }

    /// Recommendations for each risk indicator found
    pub async fn scan_risks(
        &self,
        terms: &[String],
        flags: &[RiskFlag],
        project: &ProjectContext,
    ) -> Result<AgentOutput, AgentError> {
        debug!(?terms, flags = flags.len(), "scan_risks: called");
        let task = self.agent.render(
            "risk-scan",
            &json!({
                "repository": project.repository,
                "terms": terms.join(", "),
                "flags": flags.iter().map(describe_flag).collect::<Vec<_>>(),
            }),
        )?;
        self.agent.execute_task(&task, Some(&project.to_map())).await
    }
}
