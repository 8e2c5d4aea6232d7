//! Workflow sequencing
//!
//! The crew owns the agents, the integrations and the approval gate. Each
//! workflow collects data, lets an agent draft, and routes every outbound
//! write through the gate before dispatching it.

use std::sync::Arc;

use chrono::Utc;
use eyre::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::agents::{
    AgentOutput, AgentSettings, AgentSummary, MonitorAgent, PlannerAgent, ReporterAgent, SprintReport,
    StandupReport,
};
use crate::approval::{
    ApprovalGate, ApprovalOutcome, ApprovalRequest, ApprovalStatus, GateInfo, InteractionHistory, RiskLevel,
};
use crate::config::{Config, ProjectContext};
use crate::console::LineSource;
use crate::github::{CreateIssueParams, GitHubClient, Issue, IssueQuery, IssueState, RiskFlag, default_terms};
use crate::llm::{self, LlmClient};
use crate::prompts::PromptLoader;
use crate::slack::{SlackClient, StandupContent};

const ISSUE_WINDOW: usize = 100;
const BRIEF_PREVIEW_CHARS: usize = 100;

/// Result of one workflow run
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub workflow: String,
    pub success: bool,
    /// Status of the workflow's first gate; `None` if the workflow failed before asking
    pub approval_status: Option<ApprovalStatus>,
    pub message: String,
    /// One entry per item sent to GitHub or Slack
    pub dispatched: Vec<Value>,
    pub agent_output: Option<AgentOutput>,
}

impl WorkflowOutcome {
    fn new(workflow: &str, approval: &ApprovalOutcome, message: impl Into<String>) -> Self {
        Self {
            workflow: workflow.to_string(),
            success: true,
            approval_status: Some(approval.status),
            message: message.into(),
            dispatched: Vec::new(),
            agent_output: None,
        }
    }

    /// The gate said no (or nobody answered)
    fn declined(workflow: &str, label: &str, approval: &ApprovalOutcome) -> Self {
        let message = match approval.status {
            ApprovalStatus::Timeout => format!("{} timed out waiting for approval", label),
            _ => format!("{} rejected: {}", label, approval.message),
        };
        info!(%workflow, status = %approval.status, "workflow declined at the gate");
        Self {
            workflow: workflow.to_string(),
            success: false,
            approval_status: Some(approval.status),
            message,
            dispatched: Vec::new(),
            agent_output: None,
        }
    }

    /// The workflow stopped on an error
    pub fn failed(workflow: &str, error: &eyre::Report) -> Self {
        Self {
            workflow: workflow.to_string(),
            success: false,
            approval_status: None,
            message: format!("{:#}", error),
            dispatched: Vec::new(),
            agent_output: None,
        }
    }
}

/// Results of `run_full_workflow`, in execution order
#[derive(Debug, Clone, Serialize)]
pub struct FullWorkflowOutcome {
    pub overall_success: bool,
    pub workflows: Vec<WorkflowOutcome>,
}

/// Which agent handles a webhook event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRoute {
    Planner,
    Monitor,
    Reporter,
}

impl WebhookRoute {
    pub fn for_event(event: &str) -> Self {
        match event {
            "issues" | "pull_request" => Self::Planner,
            "workflow_run" | "check_run" => Self::Monitor,
            _ => Self::Reporter,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrewConfiguration {
    pub human_approval_required: bool,
    pub github_actions_enabled: bool,
    pub interactive_mode: bool,
    pub auto_approve_threshold: Option<RiskLevel>,
    pub approval_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrewStatus {
    pub project: ProjectContext,
    pub agents: Vec<(String, AgentSummary)>,
    pub configuration: CrewConfiguration,
}

pub struct Crew {
    config: Config,
    project: ProjectContext,
    gate: Arc<ApprovalGate>,
    github: GitHubClient,
    slack: SlackClient,
    planner: PlannerAgent,
    reporter: ReporterAgent,
    monitor: MonitorAgent,
}

impl std::fmt::Debug for Crew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crew")
            .field("repository", &self.project.repository)
            .field("gate", &self.gate)
            .finish()
    }
}

impl Crew {
    /// Validate the configuration and connect every integration
    pub fn from_config(config: Config, input: Arc<dyn LineSource>) -> Result<Self> {
        debug!("Crew::from_config: called");
        config.validate()?;

        let llm = llm::create_client(&config.llm).context("Failed to create LLM client")?;
        let github = GitHubClient::from_config(&config.github).context("Failed to create GitHub client")?;
        let slack = SlackClient::from_config(&config.slack).context("Failed to create Slack client")?;

        let info = GateInfo {
            repository: config.repository(),
            current_sprint: config.project.current_sprint.clone(),
        };
        let mut gate = ApprovalGate::new(config.approval_policy(), input, info);
        if let Some(path) = config.history_path() {
            gate = gate.with_history(InteractionHistory::with_log(path));
        }

        let prompts = Arc::new(PromptLoader::default());
        Ok(Self::new(config, Arc::new(gate), llm, github, slack, prompts))
    }

    pub fn new(
        config: Config,
        gate: Arc<ApprovalGate>,
        llm: Arc<dyn LlmClient>,
        github: GitHubClient,
        slack: SlackClient,
        prompts: Arc<PromptLoader>,
    ) -> Self {
        let settings = AgentSettings::from_config(&config);
        let project = config.project_context();
        info!(project = %project.project_name, repository = %project.repository, "Crew initialized");
        Self {
            planner: PlannerAgent::new(llm.clone(), prompts.clone(), settings.clone()),
            reporter: ReporterAgent::new(llm.clone(), prompts.clone(), settings.clone()),
            monitor: MonitorAgent::new(llm, prompts, settings),
            config,
            project,
            gate,
            github,
            slack,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    pub fn github(&self) -> &GitHubClient {
        &self.github
    }

    fn context(&self) -> Map<String, Value> {
        self.project.to_map()
    }

    async fn all_issues(&self) -> Result<Vec<Issue>> {
        let query = IssueQuery {
            state: IssueState::All,
            limit: ISSUE_WINDOW,
            ..Default::default()
        };
        self.github.list_issues(&query).await.context("Failed to list issues")
    }

    /// Plan a brief and create the approved issues
    pub async fn run_planning_workflow(&self, brief: &str) -> Result<WorkflowOutcome> {
        debug!(brief_len = brief.len(), "run_planning_workflow: called");
        let preview: String = brief.chars().take(BRIEF_PREVIEW_CHARS).collect();
        let ellipsis = if brief.chars().count() > BRIEF_PREVIEW_CHARS { "..." } else { "" };

        let mut proposed = Map::new();
        proposed.insert("project_brief".into(), json!(brief));
        proposed.insert("target_repository".into(), json!(self.project.repository));
        proposed.insert("team_members".into(), json!(self.project.team_members));
        let request = ApprovalRequest::new(
            "project_planning",
            format!("Plan and break down project: {}{}", preview, ellipsis),
            proposed,
            RiskLevel::Low,
        )
        .with_context(self.context());

        let approval = self.gate.request(request).await;
        if !approval.is_approved() {
            return Ok(WorkflowOutcome::declined("planning", "Planning", &approval));
        }
        let brief = approval.action_str("project_brief").unwrap_or(brief).to_string();

        let draft = self.planner.plan_project(&brief, &self.project).await?;
        let proposed_count = draft.issues.len();
        let mut outcome = WorkflowOutcome::new("planning", &approval, "");
        let mut failures = Vec::new();
        let mut declined = 0usize;

        for issue in &draft.issues {
            let params = match serde_json::to_value(issue) {
                Ok(Value::Object(map)) => map,
                _ => continue,
            };
            let mut context = Map::new();
            context.insert("project_brief".into(), json!(brief));
            context.insert("repository".into(), json!(self.project.repository));

            let decision = self.gate.request_github_action("create_issue", params, context).await;
            let Some(action) = decision.action else {
                declined += 1;
                continue;
            };

            let params: CreateIssueParams = match serde_json::from_value(Value::Object(action)) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "run_planning_workflow: modified issue is invalid");
                    failures.push(format!("{}: invalid parameters ({})", issue.title, e));
                    continue;
                }
            };
            match self.github.create_issue(&params).await {
                Ok(created) => {
                    info!(number = created.number, title = %created.title, "Created issue");
                    outcome.dispatched.push(json!({
                        "kind": "issue",
                        "number": created.number,
                        "title": created.title,
                        "url": created.html_url,
                    }));
                }
                Err(e) => {
                    warn!(error = %e, title = %params.title, "run_planning_workflow: create_issue failed");
                    failures.push(format!("{}: {}", params.title, e));
                }
            }
        }

        let mut message = format!(
            "Created {} of {} proposed issues",
            outcome.dispatched.len(),
            proposed_count
        );
        if declined > 0 {
            message.push_str(&format!(", {} declined", declined));
        }
        if !draft.skipped.is_empty() {
            message.push_str(&format!(", {} unparseable drafts skipped", draft.skipped.len()));
        }
        for failure in &failures {
            message.push_str(&format!("\n  failed: {}", failure));
        }

        outcome.success = failures.is_empty();
        outcome.message = message;
        outcome.agent_output = Some(draft.output);
        Ok(outcome)
    }

    /// Collect the day's activity, summarize it, and post it to Slack
    pub async fn run_daily_standup(&self) -> Result<WorkflowOutcome> {
        debug!("run_daily_standup: called");
        let issues = self.all_issues().await?;
        let mut report = StandupReport::from_issues(&issues, Utc::now());
        let output = self.reporter.generate_daily_standup(&report, &self.project).await?;
        report.summary = Some(output.response.clone());

        let mut proposed = Map::new();
        proposed.insert("target_channel".into(), json!(self.project.slack_channel));
        proposed.insert("repository".into(), json!(self.project.repository));
        proposed.insert("include_github_projects".into(), json!(self.project.github_project_id.is_some()));
        proposed.insert("summary".into(), json!(report.summary));
        proposed.insert("completed".into(), json!(report.completed));
        proposed.insert("planned".into(), json!(report.planned));
        proposed.insert("blockers".into(), json!(report.blockers));
        let request = ApprovalRequest::new(
            "daily_standup",
            "Generate and post daily standup report to team",
            proposed,
            RiskLevel::Low,
        )
        .with_context(self.context());

        let approval = self.gate.request(request).await;
        if !approval.is_approved() {
            let mut outcome = WorkflowOutcome::declined("standup", "Standup", &approval);
            outcome.agent_output = Some(output);
            return Ok(outcome);
        }

        let channel = approval
            .action_str("target_channel")
            .unwrap_or(&self.project.slack_channel)
            .to_string();
        let summary = approval.action_str("summary").or(report.summary.as_deref());
        let date = report.date.to_string();
        let content = StandupContent {
            summary,
            completed: &report.completed,
            planned: &report.planned,
            blockers: &report.blockers,
            progress: Some(report.progress),
        };
        let posted = self
            .slack
            .post_daily_standup(&channel, &date, &content)
            .await
            .context("Failed to post standup to Slack")?;

        let mut outcome = WorkflowOutcome::new("standup", &approval, format!("Standup posted to #{}", posted.channel));
        outcome
            .dispatched
            .push(json!({ "kind": "slack", "channel": posted.channel, "ts": posted.ts }));
        outcome.agent_output = Some(output);
        Ok(outcome)
    }

    /// Health score, risk scan and assessment; alerts go to Slack after a second approval
    pub async fn run_monitoring_check(&self) -> Result<WorkflowOutcome> {
        debug!("run_monitoring_check: called");
        let mut proposed = Map::new();
        proposed.insert("repository".into(), json!(self.project.repository));
        proposed.insert("check_workflows".into(), json!(self.config.ci.actions_enabled));
        proposed.insert("check_critical_issues".into(), json!(true));
        proposed.insert("generate_alerts".into(), json!(true));
        let request = ApprovalRequest::new(
            "monitoring_check",
            "Scan repository for risks, issues, and CI/CD status",
            proposed,
            RiskLevel::Low,
        )
        .with_context(self.context());

        let approval = self.gate.request(request).await;
        if !approval.is_approved() {
            return Ok(WorkflowOutcome::declined("monitoring", "Monitoring", &approval));
        }
        let flag = |key: &str, default: bool| {
            approval
                .action
                .as_ref()
                .and_then(|a| a.get(key))
                .and_then(Value::as_bool)
                .unwrap_or(default)
        };
        let check_workflows = flag("check_workflows", self.config.ci.actions_enabled);
        let generate_alerts = flag("generate_alerts", true);

        let health = self
            .github
            .repository_health(check_workflows)
            .await
            .context("Failed to compute repository health")?;
        let flags = self
            .github
            .scan_for_risk_flags(&default_terms())
            .await
            .context("Failed to scan for risk flags")?;
        let output = self.monitor.perform_health_check(&health, &flags, &self.project).await?;

        let mut outcome = WorkflowOutcome::new(
            "monitoring",
            &approval,
            format!(
                "Health {}/100 ({}), {} risk flags",
                health.score,
                health.assessment,
                flags.len()
            ),
        );
        outcome.agent_output = Some(output);

        if generate_alerts && !flags.is_empty() {
            match self.notify(&flags).await? {
                Some(posted) => outcome.dispatched.push(posted),
                None => outcome.message.push_str("; alert not sent"),
            }
        }
        Ok(outcome)
    }

    async fn notify(&self, flags: &[RiskFlag]) -> Result<Option<Value>> {
        let high = flags.iter().filter(|f| f.severity >= RiskLevel::High).count();
        let risk = if high > 0 { RiskLevel::High } else { RiskLevel::Medium };

        let mut proposed = Map::new();
        proposed.insert("target_channel".into(), json!(self.project.slack_channel));
        proposed.insert("flag_count".into(), json!(flags.len()));
        proposed.insert("high_severity".into(), json!(high));
        proposed.insert("medium_severity".into(), json!(flags.len() - high));
        let mut context = self.context();
        context.insert("risk_flags".into(), serde_json::to_value(flags)?);
        let request = ApprovalRequest::new(
            "notify_risk_flags",
            format!("Send {} risk flag notifications to Slack", flags.len()),
            proposed,
            risk,
        )
        .with_context(context);

        let approval = self.gate.request(request).await;
        if !approval.is_approved() {
            return Ok(None);
        }
        let channel = approval
            .action_str("target_channel")
            .unwrap_or(&self.project.slack_channel)
            .to_string();
        let posted = self
            .slack
            .notify_risk_flags(&channel, flags)
            .await
            .context("Failed to send risk flags to Slack")?;
        Ok(posted.map(|p| json!({ "kind": "slack", "channel": p.channel, "ts": p.ts })))
    }

    /// Summarize a sprint from the repository's issues and post it to Slack
    pub async fn run_sprint_report(&self, name: Option<&str>) -> Result<WorkflowOutcome> {
        let name = name
            .map(str::to_string)
            .or_else(|| self.project.current_sprint.clone())
            .unwrap_or_else(|| "Current Sprint".to_string());
        debug!(%name, "run_sprint_report: called");

        let issues = self.all_issues().await?;
        let mut report = SprintReport::from_issues(&name, &issues);
        let output = self.reporter.generate_sprint_report(&mut report, &self.project).await?;

        let mut proposed = Map::new();
        proposed.insert("target_channel".into(), json!(self.project.slack_channel));
        proposed.insert("sprint_name".into(), json!(report.name));
        proposed.insert("completed_count".into(), json!(report.completed.len()));
        proposed.insert("incomplete_count".into(), json!(report.incomplete.len()));
        proposed.insert("completion_rate".into(), json!(report.metrics.completion_rate));
        proposed.insert("retrospective".into(), json!(report.retrospective));
        let request = ApprovalRequest::new(
            "sprint_report",
            format!("Post sprint report for {}", report.name),
            proposed,
            RiskLevel::Low,
        )
        .with_context(self.context());

        let approval = self.gate.request(request).await;
        if !approval.is_approved() {
            let mut outcome = WorkflowOutcome::declined("sprint_report", "Sprint report", &approval);
            outcome.agent_output = Some(output);
            return Ok(outcome);
        }

        let channel = approval
            .action_str("target_channel")
            .unwrap_or(&self.project.slack_channel)
            .to_string();
        let posted = self
            .slack
            .post_sprint_report(
                &channel,
                &report.name,
                &report.metrics,
                &report.completed,
                &report.incomplete,
                &report.retrospective,
            )
            .await
            .context("Failed to post sprint report to Slack")?;

        let mut outcome = WorkflowOutcome::new(
            "sprint_report",
            &approval,
            format!("Sprint report for {} posted to #{}", report.name, posted.channel),
        );
        outcome
            .dispatched
            .push(json!({ "kind": "slack", "channel": posted.channel, "ts": posted.ts }));
        outcome.agent_output = Some(output);
        Ok(outcome)
    }

    /// Planning (when a brief is given), then standup, then monitoring
    ///
    /// An error in one workflow is reported as a failed outcome and the
    /// remaining workflows still run.
    pub async fn run_full_workflow(&self, brief: Option<&str>) -> FullWorkflowOutcome {
        debug!(has_brief = brief.is_some(), "run_full_workflow: called");
        let mut workflows = Vec::new();

        if let Some(brief) = brief {
            workflows.push(settle("planning", self.run_planning_workflow(brief).await));
        }
        workflows.push(settle("standup", self.run_daily_standup().await));
        workflows.push(settle("monitoring", self.run_monitoring_check().await));

        FullWorkflowOutcome {
            overall_success: workflows.iter().all(|w| w.success),
            workflows,
        }
    }

    /// Gate a GitHub webhook event and hand it to the matching agent
    pub async fn handle_github_webhook(&self, event: &str, payload: &Value) -> Result<WorkflowOutcome> {
        debug!(%event, "handle_github_webhook: called");
        let repository = payload
            .pointer("/repository/full_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let action = payload.get("action").and_then(Value::as_str).unwrap_or("unknown");

        let mut proposed = Map::new();
        proposed.insert("event_type".into(), json!(event));
        proposed.insert("repository".into(), json!(repository));
        proposed.insert("action".into(), json!(action));
        let mut context = self.context();
        context.insert("webhook_payload".into(), payload.clone());
        let request = ApprovalRequest::new(
            format!("github_webhook_{}", event),
            format!("Process GitHub webhook event: {}", event),
            proposed,
            RiskLevel::Medium,
        )
        .with_context(context);

        let workflow = format!("webhook_{}", event);
        let approval = self.gate.request(request).await;
        if !approval.is_approved() {
            return Ok(WorkflowOutcome::declined(&workflow, "Webhook handling", &approval));
        }

        let route = WebhookRoute::for_event(event);
        let agent = match route {
            WebhookRoute::Planner => self.planner.agent(),
            WebhookRoute::Monitor => self.monitor.agent(),
            WebhookRoute::Reporter => self.reporter.agent(),
        };
        let pretty = serde_json::to_string_pretty(payload)?;
        let task = agent.render(
            "webhook",
            &json!({
                "event": event,
                "action": (action != "unknown").then_some(action),
                "repository": repository,
                "payload": pretty,
            }),
        )?;
        let output = agent.execute_task(&task, Some(&self.context())).await?;
        info!(%event, agent = %agent.role(), "Webhook handled");

        let mut outcome = WorkflowOutcome::new(&workflow, &approval, format!("Handled by {}", agent.role()));
        outcome.agent_output = Some(output);
        Ok(outcome)
    }

    /// Project context, agents, and behavior flags
    pub fn crew_status(&self) -> CrewStatus {
        CrewStatus {
            project: self.project.clone(),
            agents: vec![
                ("planner".to_string(), AgentSummary::from(self.planner.agent().profile())),
                ("reporter".to_string(), AgentSummary::from(self.reporter.agent().profile())),
                ("monitor".to_string(), AgentSummary::from(self.monitor.agent().profile())),
            ],
            configuration: CrewConfiguration {
                human_approval_required: self.config.approval.required,
                github_actions_enabled: self.config.ci.actions_enabled,
                interactive_mode: self.config.approval.interactive,
                auto_approve_threshold: self.config.approval.auto_approve_threshold,
                approval_timeout_secs: self.config.approval.timeout().map(|t| t.as_secs()),
            },
        }
    }
}

fn settle(workflow: &str, result: Result<WorkflowOutcome>) -> WorkflowOutcome {
    result.unwrap_or_else(|e| {
        warn!(%workflow, error = %e, "workflow failed");
        WorkflowOutcome::failed(workflow, &e)
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::approval::ApprovalPolicy;
    use crate::console::ScriptedInput;
    use crate::llm::client::mock::MockLlmClient;

    pub fn config() -> Config {
        let mut config = Config::default();
        config.github.owner = "acme".into();
        config.github.repo = "widgets".into();
        config.project.name = "Widgets".into();
        config.project.team_members = vec!["alice".into()];
        config.slack.channel = "#pm-updates".into();
        config
    }

    pub fn strict() -> ApprovalPolicy {
        ApprovalPolicy {
            approval_required: true,
            auto_approve_threshold: None,
            timeout: None,
        }
    }

    /// Crew talking to one mock server: GitHub at the root, Slack under `/slack`
    pub fn crew_with(
        config: Config,
        server_url: &str,
        llm: Arc<MockLlmClient>,
        input: Arc<ScriptedInput>,
        policy: ApprovalPolicy,
    ) -> Crew {
        let info = GateInfo {
            repository: config.repository(),
            current_sprint: config.project.current_sprint.clone(),
        };
        let gate = Arc::new(ApprovalGate::new(policy, input, info));
        let mut github = GitHubClient::new(server_url, "ghp_test", "acme", "widgets").unwrap();
        if let Some(id) = &config.github.project_id {
            github = github.with_project(id);
        }
        let slack = SlackClient::new(&format!("{}/slack", server_url), "xoxb-test").unwrap();
        Crew::new(config, gate, llm, github, slack, Arc::new(PromptLoader::embedded_only()))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{config, crew_with, strict};
    use super::*;
    use crate::approval::ApprovalPolicy;
    use crate::console::ScriptedInput;
    use crate::llm::client::mock::MockLlmClient;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    const ISSUES: &str = r#"[
      {"number": 1, "title": "Fix login", "body": null, "state": "closed", "labels": [], "assignees": [],
       "html_url": "https://github.com/acme/widgets/issues/1", "created_at": "2024-05-01T00:00:00Z",
       "updated_at": "2024-05-01T00:00:00Z", "closed_at": "2024-05-01T00:00:00Z"},
      {"number": 2, "title": "Add search", "body": null, "state": "open", "labels": [{"name": "blocked"}], "assignees": [],
       "html_url": "https://github.com/acme/widgets/issues/2", "created_at": "2024-05-01T00:00:00Z",
       "updated_at": "2024-05-01T00:00:00Z", "closed_at": null}
    ]"#;

    fn crew(server: &Server, llm: Arc<MockLlmClient>, input: Arc<ScriptedInput>, policy: ApprovalPolicy) -> Crew {
        crew_with(config(), &server.url(), llm, input, policy)
    }

    #[test]
    fn test_webhook_routing() {
        assert_eq!(WebhookRoute::for_event("issues"), WebhookRoute::Planner);
        assert_eq!(WebhookRoute::for_event("pull_request"), WebhookRoute::Planner);
        assert_eq!(WebhookRoute::for_event("workflow_run"), WebhookRoute::Monitor);
        assert_eq!(WebhookRoute::for_event("check_run"), WebhookRoute::Monitor);
        assert_eq!(WebhookRoute::for_event("push"), WebhookRoute::Reporter);
    }

    #[tokio::test]
    async fn test_planning_rejected_makes_no_llm_call() {
        let server = Server::new_async().await;
        let llm = Arc::new(MockLlmClient::with_text(&[]));
        let input = Arc::new(ScriptedInput::new(["r", "not now"]));
        let crew = crew(&server, llm.clone(), input, strict());

        let outcome = crew.run_planning_workflow("Add dark mode").await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.approval_status, Some(ApprovalStatus::Rejected));
        assert_eq!(outcome.message, "Planning rejected: Rejected by user: not now");
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_planning_timeout_is_distinct_outcome() {
        let server = Server::new_async().await;
        let llm = Arc::new(MockLlmClient::with_text(&[]));
        let input = Arc::new(ScriptedInput::new(Vec::<String>::new()).hang_when_exhausted());
        let policy = ApprovalPolicy {
            timeout: Some(Duration::from_millis(50)),
            ..strict()
        };
        let crew = crew(&server, llm, input, policy);

        let outcome = crew.run_planning_workflow("Add dark mode").await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.approval_status, Some(ApprovalStatus::Timeout));
        assert_eq!(outcome.message, "Planning timed out waiting for approval");
    }

    #[tokio::test]
    async fn test_planning_creates_only_approved_issues() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/repos/acme/widgets/issues")
            .match_body(Matcher::PartialJson(json!({ "title": "Add OAuth login" })))
            .with_status(201)
            .with_body(
                r#"{"number": 42, "title": "Add OAuth login", "body": "", "state": "open", "labels": [],
                "assignees": [], "html_url": "https://github.com/acme/widgets/issues/42",
                "created_at": "2024-05-01T00:00:00Z", "updated_at": "2024-05-01T00:00:00Z", "closed_at": null}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let plan = "Plan\n```json\n[{\"title\": \"Add OAuth login\"}, {\"title\": \"Rewrite everything\"}]\n```";
        let llm = Arc::new(MockLlmClient::with_text(&[plan]));
        // approve planning, approve first issue, reject second with no reason
        let input = Arc::new(ScriptedInput::new(["a", "a", "r", ""]));
        let crew = crew(&server, llm, input, strict());

        let outcome = crew.run_planning_workflow("Add login").await.unwrap();

        create.assert_async().await;
        assert!(outcome.success);
        assert_eq!(outcome.dispatched.len(), 1);
        assert_eq!(outcome.dispatched[0]["number"], 42);
        assert_eq!(outcome.message, "Created 1 of 2 proposed issues, 1 declined");
        assert_eq!(crew.gate().summary().total, 3);
    }

    #[tokio::test]
    async fn test_modified_brief_reaches_planner() {
        let server = Server::new_async().await;
        let llm = Arc::new(MockLlmClient::with_text(&["No issues this time."]));
        let input = Arc::new(ScriptedInput::new(["m", "project_brief=Add SSO", "done"]));
        let crew = crew(&server, llm.clone(), input, strict());

        let outcome = crew.run_planning_workflow("Add login").await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.approval_status, Some(ApprovalStatus::Modified));
        assert!(llm.requests()[0].messages[0].content.contains("Project Brief: Add SSO"));
    }

    #[tokio::test]
    async fn test_daily_standup_posts_after_approval() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ISSUES)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/slack/chat.postMessage")
            .match_body(Matcher::PartialJson(json!({ "channel": "pm-updates" })))
            .with_status(200)
            .with_body(r#"{"ok": true, "channel": "C1", "ts": "1.2"}"#)
            .expect(1)
            .create_async()
            .await;

        let llm = Arc::new(MockLlmClient::with_text(&["One blocker on search."]));
        let input = Arc::new(ScriptedInput::new(["a"]));
        let crew = crew(&server, llm, input, strict());

        let outcome = crew.run_daily_standup().await.unwrap();

        post.assert_async().await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "Standup posted to #C1");
        assert_eq!(outcome.agent_output.unwrap().response, "One blocker on search.");
    }

    #[tokio::test]
    async fn test_standup_rejected_posts_nothing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ISSUES)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/slack/chat.postMessage")
            .expect(0)
            .create_async()
            .await;

        let llm = Arc::new(MockLlmClient::with_text(&["summary"]));
        let input = Arc::new(ScriptedInput::new(["r", ""]));
        let crew = crew(&server, llm, input, strict());

        let outcome = crew.run_daily_standup().await.unwrap();

        post.assert_async().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Standup rejected: Rejected by user");
    }

    /// GitHub side of a monitoring check: the given commit message, no open search hits
    async fn monitoring_server(commit_message: &str) -> mockito::ServerGuard {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ISSUES)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/widgets/commits")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!([{
                    "sha": "1111111122222222",
                    "html_url": "https://github.com/acme/widgets/commit/1111111",
                    "commit": { "message": commit_message, "author": { "name": "bob", "date": null } }
                }])
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/search/issues")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items": []}"#)
            .create_async()
            .await;
        server
    }

    #[tokio::test]
    async fn test_monitoring_alert_escalates_and_can_be_declined() {
        let mut server = monitoring_server("Patch security hole in session handling").await;
        let post = server
            .mock("POST", "/slack/chat.postMessage")
            .expect(0)
            .create_async()
            .await;

        let llm = Arc::new(MockLlmClient::with_text(&["One security fix landed."]));
        let input = Arc::new(ScriptedInput::new(["a", "r", ""]));
        let crew = crew(&server, llm, input.clone(), strict());

        let outcome = crew.run_monitoring_check().await.unwrap();

        post.assert_async().await;
        assert!(outcome.success);
        assert!(outcome.message.starts_with("Health "));
        assert!(outcome.message.ends_with("1 risk flags; alert not sent"));
        assert!(outcome.dispatched.is_empty());

        let recent = crew.gate().summary().recent;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].action_type, "notify_risk_flags");
        assert_eq!(recent[1].risk_level, RiskLevel::High);
        assert_eq!(recent[1].status, ApprovalStatus::Rejected);
        assert_eq!(input.remaining(), 0);
    }

    #[tokio::test]
    async fn test_monitoring_medium_flags_alert_at_medium_risk() {
        let mut server = monitoring_server("Unblock release, was a blocker").await;
        let post = server
            .mock("POST", "/slack/chat.postMessage")
            .match_body(Matcher::PartialJson(json!({ "channel": "pm-updates" })))
            .with_status(200)
            .with_body(r#"{"ok": true, "channel": "C1", "ts": "3.4"}"#)
            .expect(1)
            .create_async()
            .await;

        let llm = Arc::new(MockLlmClient::with_text(&["Minor blocker noted."]));
        let input = Arc::new(ScriptedInput::new(["a", "a"]));
        let crew = crew(&server, llm, input, strict());

        let outcome = crew.run_monitoring_check().await.unwrap();

        post.assert_async().await;
        assert!(outcome.success);
        assert!(outcome.message.ends_with("1 risk flags"));
        assert_eq!(outcome.dispatched, vec![json!({ "kind": "slack", "channel": "C1", "ts": "3.4" })]);
        let recent = crew.gate().summary().recent;
        assert_eq!(recent[1].risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_monitoring_alerts_switched_off_by_modification() {
        let mut server = monitoring_server("Fix critical crash on startup").await;
        let post = server
            .mock("POST", "/slack/chat.postMessage")
            .expect(0)
            .create_async()
            .await;

        let llm = Arc::new(MockLlmClient::with_text(&["Crash fix is in."]));
        let input = Arc::new(ScriptedInput::new(["m", "generate_alerts=false", "done"]));
        let crew = crew(&server, llm, input.clone(), strict());

        let outcome = crew.run_monitoring_check().await.unwrap();

        post.assert_async().await;
        assert!(outcome.success);
        assert_eq!(outcome.approval_status, Some(ApprovalStatus::Modified));
        assert!(outcome.message.ends_with("1 risk flags"));
        let recent = crew.gate().summary().recent;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].action_type, "monitoring_check");
        assert_eq!(input.remaining(), 0);
    }

    #[tokio::test]
    async fn test_sprint_report_posts_after_approval() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ISSUES)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/slack/chat.postMessage")
            .match_body(Matcher::PartialJson(json!({ "channel": "pm-updates" })))
            .with_status(200)
            .with_body(r#"{"ok": true, "channel": "C1", "ts": "5.6"}"#)
            .expect(1)
            .create_async()
            .await;

        let llm = Arc::new(MockLlmClient::with_text(&["Half done; search is blocked."]));
        let input = Arc::new(ScriptedInput::new(["a"]));
        let crew = crew(&server, llm, input, strict());

        let outcome = crew.run_sprint_report(Some("Sprint 7")).await.unwrap();

        post.assert_async().await;
        assert!(outcome.success);
        assert_eq!(outcome.workflow, "sprint_report");
        assert_eq!(outcome.message, "Sprint report for Sprint 7 posted to #C1");
        assert_eq!(outcome.dispatched.len(), 1);
        assert_eq!(crew.gate().summary().recent[0].action_type, "sprint_report");
    }

    #[tokio::test]
    async fn test_sprint_report_rejected_posts_nothing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(ISSUES)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/slack/chat.postMessage")
            .expect(0)
            .create_async()
            .await;

        let llm = Arc::new(MockLlmClient::with_text(&["Half done."]));
        let input = Arc::new(ScriptedInput::new(["r", "wait for the demo"]));
        let crew = crew(&server, llm, input, strict());

        let outcome = crew.run_sprint_report(Some("Sprint 7")).await.unwrap();

        post.assert_async().await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Sprint report rejected: Rejected by user: wait for the demo");
        assert_eq!(outcome.agent_output.unwrap().response, "Half done.");
    }

    #[tokio::test]
    async fn test_full_workflow_reports_each_result() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"message": "boom"}"#)
            .create_async()
            .await;

        let llm = Arc::new(MockLlmClient::with_text(&[]));
        // the standup fails before asking; monitoring is rejected
        let input = Arc::new(ScriptedInput::new(["r", ""]));
        let crew = crew(&server, llm, input, strict());

        let outcome = crew.run_full_workflow(None).await;

        assert!(!outcome.overall_success);
        assert_eq!(outcome.workflows.len(), 2);
        assert_eq!(outcome.workflows[0].workflow, "standup");
        assert!(outcome.workflows[0].approval_status.is_none());
        assert!(outcome.workflows[0].message.contains("Failed to list issues"));
        assert_eq!(outcome.workflows[1].workflow, "monitoring");
        assert_eq!(outcome.workflows[1].approval_status, Some(ApprovalStatus::Rejected));
    }

    #[tokio::test]
    async fn test_webhook_goes_to_monitor() {
        let server = Server::new_async().await;
        let llm = Arc::new(MockLlmClient::with_text(&["CI is red on main."]));
        let input = Arc::new(ScriptedInput::new(["a"]));
        let crew = crew(&server, llm.clone(), input.clone(), strict());
        let payload = json!({ "action": "completed", "repository": { "full_name": "acme/widgets" } });

        let outcome = crew.handle_github_webhook("workflow_run", &payload).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.workflow, "webhook_workflow_run");
        assert_eq!(outcome.message, "Handled by System Monitor");
        let request = &llm.requests()[0];
        assert!(request.system_prompt.starts_with("You are a System Monitor."));
        assert!(request.messages[0].content.contains("`workflow_run` event (completed)"));
        assert_eq!(crew.gate().summary().recent[0].action_type, "github_webhook_workflow_run");
    }

    #[tokio::test]
    async fn test_crew_status() {
        let server = Server::new_async().await;
        let crew = crew(
            &server,
            Arc::new(MockLlmClient::with_text(&[])),
            Arc::new(ScriptedInput::new(Vec::<String>::new())),
            strict(),
        );

        let status = crew.crew_status();
        assert_eq!(status.project.repository, "acme/widgets");
        let names: Vec<&str> = status.agents.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["planner", "reporter", "monitor"]);
        assert_eq!(status.agents[2].1.role, "System Monitor");
        assert!(status.configuration.human_approval_required);
    }
}
