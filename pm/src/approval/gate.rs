//! The human approval gate
//!
//! Every outbound write passes through [`ApprovalGate::request`]. Policy may
//! approve it outright; otherwise the request is rendered on the terminal and
//! the operator decides. Critical requests always reach the operator.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use colored::{ColoredString, Colorize};
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::history::{InteractionHistory, InteractionRecord, InteractionSummary};
use super::{ApprovalOutcome, ApprovalPolicy, ApprovalRequest, ApprovalStatus, RiskLevel};
use crate::console::{ConsoleError, LineSource};

const CHOICE_PROMPT: &str = "What would you like to do? [a/r/m/i/s]: ";
const MODIFY_PROMPT: &str = "Enter modification: ";
const REASON_PROMPT: &str = "Reason for rejection (optional): ";

/// Static facts shown by the `i` option
#[derive(Debug, Clone, Default)]
pub struct GateInfo {
    pub repository: String,
    pub current_sprint: Option<String>,
}

/// Result of one bounded read
enum Read {
    Line(String),
    Done(ApprovalOutcome),
}

/// Result of the parameter editor
enum Edit {
    Done(Map<String, Value>),
    Cancelled,
    Ended(ApprovalOutcome),
}

/// Synchronous approval checkpoint in front of GitHub and Slack writes
pub struct ApprovalGate {
    policy: ApprovalPolicy,
    input: Arc<dyn LineSource>,
    info: GateInfo,
    session_auto: Mutex<HashSet<String>>,
    history: Mutex<InteractionHistory>,
}

impl ApprovalGate {
    pub fn new(policy: ApprovalPolicy, input: Arc<dyn LineSource>, info: GateInfo) -> Self {
        debug!(?policy, "ApprovalGate::new: called");
        Self {
            policy,
            input,
            info,
            session_auto: Mutex::new(HashSet::new()),
            history: Mutex::new(InteractionHistory::new()),
        }
    }

    /// Persist decisions to the given history
    pub fn with_history(mut self, history: InteractionHistory) -> Self {
        self.history = Mutex::new(history);
        self
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Action types the operator chose to skip for this session
    pub fn session_auto_approved(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .session_auto
            .lock()
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        types.sort();
        types
    }

    pub fn summary(&self) -> InteractionSummary {
        self.history.lock().map(|h| h.summary()).unwrap_or_default()
    }

    /// Decide on a proposed action
    pub async fn request(&self, request: ApprovalRequest) -> ApprovalOutcome {
        debug!(id = %request.id, action_type = %request.action_type, risk = %request.risk_level, "request: called");

        let (outcome, auto) = match self.auto_decision(&request) {
            Some(message) => {
                debug!(%message, "request: auto decision");
                (ApprovalOutcome::approved(request.proposed_action.clone(), message), true)
            }
            None => (self.prompt(&request).await, false),
        };

        info!(
            action_type = %request.action_type,
            risk = %request.risk_level,
            status = %outcome.status,
            auto,
            "approval decided"
        );
        self.record(&request, &outcome, auto);
        outcome
    }

    /// Classify and gate a GitHub write
    pub async fn request_github_action(
        &self,
        action_name: &str,
        params: Map<String, Value>,
        context: Map<String, Value>,
    ) -> ApprovalOutcome {
        let risk = github_action_risk(action_name, &params);
        let request = ApprovalRequest::new(
            format!("github_{}", action_name),
            format!("Execute GitHub action: {}", action_name),
            params,
            risk,
        )
        .with_context(context);
        self.request(request).await
    }

    /// Policy decision, or `None` when a human has to decide
    fn auto_decision(&self, request: &ApprovalRequest) -> Option<&'static str> {
        let risk = request.risk_level;
        if risk == RiskLevel::Critical {
            return None;
        }
        let skipped = self
            .session_auto
            .lock()
            .map(|s| s.contains(&request.action_type))
            .unwrap_or(false);
        if skipped {
            return Some("Auto-approved (skipped for this session)");
        }
        if let Some(threshold) = self.policy.auto_approve_threshold
            && risk <= threshold
        {
            return Some("Auto-approved (low risk)");
        }
        if !self.policy.approval_required && risk < RiskLevel::High {
            return Some("Auto-approved (approval not required)");
        }
        None
    }

    fn record(&self, request: &ApprovalRequest, outcome: &ApprovalOutcome, auto: bool) {
        let record = InteractionRecord {
            timestamp: Utc::now(),
            action_type: request.action_type.clone(),
            risk_level: request.risk_level,
            status: outcome.status,
            description: request.description.clone(),
            auto,
            feedback: outcome.feedback.clone(),
        };
        match self.history.lock() {
            Ok(mut history) => history.record(record),
            Err(_) => warn!("record: history lock poisoned, decision not recorded"),
        }
    }

    fn deadline(&self, request: &ApprovalRequest) -> Option<Instant> {
        let timeout = request.timeout.or(self.policy.timeout)?;
        let elapsed = (Utc::now() - request.created_at).to_std().unwrap_or(Duration::ZERO);
        Some(Instant::now() + timeout.saturating_sub(elapsed))
    }

    async fn read(&self, prompt: &str, deadline: Option<Instant>) -> Read {
        let result = match deadline {
            Some(deadline) => self.input.read_line_until(prompt, deadline).await,
            None => self.input.read_line(prompt).await,
        };

        match result {
            Ok(Some(line)) => Read::Line(line),
            Err(ConsoleError::TimedOut) => {
                println!("\n{}", "⏰ Approval request timed out".yellow());
                Read::Done(ApprovalOutcome::timed_out())
            }
            Ok(None) => Read::Done(ApprovalOutcome::rejected("Input closed", None)),
            Err(ConsoleError::Interrupted) => Read::Done(ApprovalOutcome::rejected("Interrupted by user", None)),
            Err(e) => Read::Done(ApprovalOutcome::rejected(format!("Input error: {}", e), None)),
        }
    }

    async fn prompt(&self, request: &ApprovalRequest) -> ApprovalOutcome {
        debug!(id = %request.id, "prompt: called");
        let deadline = self.deadline(request);
        if deadline.is_some_and(|d| d <= Instant::now()) {
            debug!("prompt: deadline already passed");
            return ApprovalOutcome::timed_out();
        }

        render_request(request);
        print_options(request.risk_level);

        loop {
            let choice = match self.read(CHOICE_PROMPT, deadline).await {
                Read::Line(line) => line,
                Read::Done(outcome) => return outcome,
            };

            match choice.trim().to_lowercase().as_str() {
                "a" | "approve" => {
                    return ApprovalOutcome::approved(request.proposed_action.clone(), "Approved by user");
                }
                "r" | "reject" => {
                    let reason = match self.read(REASON_PROMPT, deadline).await {
                        Read::Line(line) => line.trim().to_string(),
                        Read::Done(outcome) => return outcome,
                    };
                    return if reason.is_empty() {
                        ApprovalOutcome::rejected("Rejected by user", None)
                    } else {
                        ApprovalOutcome::rejected(format!("Rejected by user: {}", reason), Some(reason))
                    };
                }
                "m" | "modify" => match self.edit(&request.proposed_action, deadline).await {
                    Edit::Done(action) => return ApprovalOutcome::modified(action),
                    Edit::Cancelled => {
                        println!("{}", "Modification cancelled".dimmed());
                    }
                    Edit::Ended(outcome) => return outcome,
                },
                "i" | "info" => self.show_info(request),
                "s" | "skip" => {
                    if request.risk_level == RiskLevel::Critical {
                        println!("{}", "Critical actions cannot be skipped; decide explicitly.".red());
                        continue;
                    }
                    if let Ok(mut skipped) = self.session_auto.lock() {
                        skipped.insert(request.action_type.clone());
                    }
                    println!(
                        "{}",
                        format!("Auto-approving '{}' for the rest of this session", request.action_type).yellow()
                    );
                    return ApprovalOutcome::approved(request.proposed_action.clone(), "Auto-approved (user skipped)");
                }
                "" => {}
                other => {
                    println!("{} '{}'. Choose one of a, r, m, i, s.", "Invalid choice".red(), other);
                }
            }
        }
    }

    async fn edit(&self, original: &Map<String, Value>, deadline: Option<Instant>) -> Edit {
        println!("\n{}", "Modify Action Parameters:".bold());
        println!("Current parameters:");
        for (key, value) in original {
            println!("  {}: {}", key.cyan(), display_value(value));
        }
        println!("\n  {} - set parameter", "<key>=<value>".cyan());
        println!("  {} - finish modifications", "done".green());
        println!("  {} - cancel modifications", "cancel".red());

        let mut modified = original.clone();
        loop {
            let line = match self.read(MODIFY_PROMPT, deadline).await {
                Read::Line(line) => line,
                Read::Done(outcome) => return Edit::Ended(outcome),
            };
            let line = line.trim();

            if line.eq_ignore_ascii_case("done") {
                return Edit::Done(modified);
            }
            if line.eq_ignore_ascii_case("cancel") {
                return Edit::Cancelled;
            }
            match parse_assignment(line) {
                Some((key, value)) => {
                    println!("Set {} = {}", key.cyan(), display_value(&value));
                    modified.insert(key, value);
                }
                None => println!("{}", "Invalid format. Use key=value".red()),
            }
        }
    }

    fn show_info(&self, request: &ApprovalRequest) {
        println!("\n{}", "Additional Information:".bold());
        println!(
            "  {:16} {}",
            "Request Created".cyan(),
            request.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let timeout = match request.timeout.or(self.policy.timeout) {
            Some(t) => format!("{} seconds", t.as_secs()),
            None => "none".to_string(),
        };
        println!("  {:16} {}", "Timeout".cyan(), timeout);
        println!("  {:16} {}", "Project".cyan(), self.info.repository);
        if let Some(sprint) = &self.info.current_sprint {
            println!("  {:16} {}", "Current Sprint".cyan(), sprint);
        }
        if !request.context.is_empty() {
            println!("\n{}", "Context Details:".bold());
            let pretty = serde_json::to_string_pretty(&request.context).unwrap_or_default();
            println!("{}", pretty);
        }
    }
}

/// Risk of a GitHub action by name and parameters
pub fn github_action_risk(action_name: &str, params: &Map<String, Value>) -> RiskLevel {
    match action_name {
        "delete_issue" | "close_issue" | "merge_pull_request" => RiskLevel::Medium,
        "trigger_workflow" | "update_project_item_status" => RiskLevel::High,
        _ if mentions_critical(params) => RiskLevel::Critical,
        _ => RiskLevel::Low,
    }
}

fn mentions_critical(params: &Map<String, Value>) -> bool {
    serde_json::to_string(params)
        .map(|s| s.to_lowercase().contains("critical"))
        .unwrap_or(false)
}

/// Parse `key=value`; the value is JSON when it parses, a string otherwise
fn parse_assignment(line: &str) -> Option<(String, Value)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Some((key.to_string(), value))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => serde_json::to_string_pretty(value).unwrap_or_default(),
        other => other.to_string(),
    }
}

fn risk_label(risk: RiskLevel) -> ColoredString {
    let label = risk.to_string().to_uppercase();
    match risk {
        RiskLevel::Low => label.green().bold(),
        RiskLevel::Medium => label.yellow().bold(),
        RiskLevel::High => label.truecolor(255, 140, 0).bold(),
        RiskLevel::Critical => label.red().bold(),
    }
}

fn render_request(request: &ApprovalRequest) {
    println!("\n{}", "=".repeat(60));
    println!("🤝 {}", "Human Approval Required".bold());
    println!("{:13} {}", "Action:".bold(), request.action_type);
    println!("{:13} {}", "Risk Level:".bold(), risk_label(request.risk_level));
    println!("{:13} {}", "Description:".bold(), request.description);

    if !request.proposed_action.is_empty() {
        println!("\n{}", "Proposed Action Details:".bold());
        for (key, value) in &request.proposed_action {
            println!("  {:20} {}", key.cyan(), display_value(value));
        }
    }

    if !request.context.is_empty() {
        println!("\n{}", "Context:".bold());
        for (key, value) in &request.context {
            println!("  {}: {}", key, display_value(value));
        }
    }
}

fn print_options(risk: RiskLevel) {
    println!("\n{}", "Options:".bold());
    println!("  {} - Approve action as proposed", "a".green());
    println!("  {} - Reject action", "r".red());
    println!("  {} - Modify action parameters", "m".yellow());
    println!("  {} - Get more information", "i".blue());
    if risk != RiskLevel::Critical {
        println!("  {} - Skip (auto-approve this action type for the session)", "s".dimmed());
    }
}

impl std::fmt::Debug for ApprovalGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGate")
            .field("policy", &self.policy)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl ApprovalStatus {
    /// Terminal color for status tables
    pub fn colored(&self) -> ColoredString {
        let s = self.to_string();
        match self {
            ApprovalStatus::Approved | ApprovalStatus::Modified => s.green(),
            ApprovalStatus::Rejected => s.red(),
            ApprovalStatus::Timeout => s.yellow(),
            ApprovalStatus::Pending => s.normal(),
        }
    }
}
