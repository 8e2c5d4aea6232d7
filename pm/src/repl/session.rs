//! REPL session management

use std::sync::Arc;

use colored::{Color, ColoredString, Colorize};
use eyre::{Context, Result};
use tracing::debug;

use crate::approval::history::read_history;
use crate::approval::{InteractionRecord, InteractionSummary};
use crate::config::{Config, ProjectContext};
use crate::console::{ConsoleError, LineSource};
use crate::crew::Crew;
use crate::display::{self, Table, print_outcome};
use crate::github::{ProjectSnapshot, WorkflowRun};

const PROMPT: &str = "PM Agent> ";
const RECENT_ITEMS: usize = 5;
const TITLE_WIDTH: usize = 50;
const WORKFLOW_RUNS: usize = 10;

/// A parsed session command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Status,
    Standup,
    Monitor,
    /// Brief as typed; empty when missing
    Plan(String),
    Project,
    Workflows,
    Health,
    Team,
    Config,
    /// `true` reads the audit log instead of this session
    History { all: bool },
    Exit,
    Unknown(String),
}

/// Parse one input line; `None` for a blank line
///
/// Only the command word is case-folded.
pub fn parse_command(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "help" => ReplCommand::Help,
        "status" => ReplCommand::Status,
        "standup" => ReplCommand::Standup,
        "monitor" => ReplCommand::Monitor,
        "plan" => ReplCommand::Plan(rest.to_string()),
        "project" => ReplCommand::Project,
        "workflows" => ReplCommand::Workflows,
        "health" => ReplCommand::Health,
        "team" => ReplCommand::Team,
        "config" => ReplCommand::Config,
        "history" => ReplCommand::History {
            all: rest.eq_ignore_ascii_case("all"),
        },
        "exit" | "quit" | "q" => ReplCommand::Exit,
        other => ReplCommand::Unknown(other.to_string()),
    };
    Some(command)
}

enum Flow {
    Continue,
    Quit,
}

/// Interactive session
pub struct ReplSession<'a> {
    crew: &'a Crew,
    input: Arc<dyn LineSource>,
}

impl<'a> ReplSession<'a> {
    pub fn new(crew: &'a Crew, input: Arc<dyn LineSource>) -> Self {
        Self { crew, input }
    }

    /// Run the command loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let line = match self.input.read_line(PROMPT).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("run: end of input");
                    println!();
                    break;
                }
                Err(ConsoleError::Interrupted) => {
                    // Ctrl+C on an empty prompt just redraws it
                    println!("^C");
                    continue;
                }
                Err(e) => return Err(eyre::eyre!("Console error: {}", e)),
            };

            let Some(command) = parse_command(&line) else {
                continue;
            };
            self.input.add_history(line.trim());
            debug!(?command, "run: dispatching");

            match self.dispatch(command).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => println!("{} {:#}", "❌ Error:".red(), e),
            }
        }

        println!("👋 Goodbye! PM Agent session ended.");
        Ok(())
    }

    async fn dispatch(&self, command: ReplCommand) -> Result<Flow> {
        match command {
            ReplCommand::Exit => return Ok(Flow::Quit),
            ReplCommand::Help => help_table().print(),
            ReplCommand::Status => self.show_status().await?,
            ReplCommand::Standup => {
                println!("🔄 Generating standup report...");
                print_outcome(&self.crew.run_daily_standup().await?, false);
            }
            ReplCommand::Monitor => {
                println!("🔍 Running monitoring check...");
                print_outcome(&self.crew.run_monitoring_check().await?, false);
            }
            ReplCommand::Plan(brief) if brief.is_empty() => {
                println!("{}", "❌ Please provide a project brief after 'plan'".red());
            }
            ReplCommand::Plan(brief) => {
                println!("🎯 Planning: {}", brief);
                print_outcome(&self.crew.run_planning_workflow(&brief).await?, false);
            }
            ReplCommand::Project => project_table(self.crew.project()).print(),
            ReplCommand::Workflows => self.show_workflows().await?,
            ReplCommand::Health => self.show_health().await?,
            ReplCommand::Team => self.show_team(),
            ReplCommand::Config => config_table(self.crew.config()).print(),
            ReplCommand::History { all } => self.show_history(all)?,
            ReplCommand::Unknown(word) => {
                println!(
                    "{} Unknown command: {}. Type '{}' for available commands.",
                    "❌".red(),
                    word,
                    "help".yellow()
                );
            }
        }
        Ok(Flow::Continue)
    }

    fn print_welcome(&self) {
        let project = self.crew.project();
        let lines = vec![
            format!("Project: {}", project.project_name),
            format!("Repository: {}", project.repository),
            format!(
                "Current Sprint: {}",
                project.current_sprint.as_deref().unwrap_or("Not set")
            ),
            String::new(),
            "Type 'help' for available commands or 'exit' to quit.".to_string(),
        ];
        println!();
        println!("{}", display::panel("Interactive PM Agent", &lines).blue());
        if !project.project_description.is_empty() {
            println!("{}", project.project_description.dimmed());
        }
    }

    async fn show_status(&self) -> Result<()> {
        if self.crew.project().github_project_id.is_none() {
            println!(
                "{}",
                "⚠️ GitHub Project ID not configured. Set GITHUB_PROJECT_ID.".yellow()
            );
            return Ok(());
        }
        println!("📊 Fetching project status...");
        let snapshot = self
            .crew
            .github()
            .project_items()
            .await
            .context("Failed to fetch project status")?;

        println!("\n{} {}", "Project:".bold(), snapshot.title);
        println!("{} {}", "Total Items:".bold(), snapshot.items.len());
        for table in status_tables(&snapshot) {
            println!();
            table.print();
        }
        Ok(())
    }

    async fn show_workflows(&self) -> Result<()> {
        println!("⚙️ Fetching recent workflow runs...");
        let runs = self
            .crew
            .github()
            .workflow_runs(None, WORKFLOW_RUNS)
            .await
            .context("Failed to fetch workflows")?;
        if runs.is_empty() {
            println!("{}", "No workflow runs found.".dimmed());
            return Ok(());
        }
        workflow_table(&runs).print();
        Ok(())
    }

    async fn show_health(&self) -> Result<()> {
        println!("🏥 Assessing repository health...");
        let health = self
            .crew
            .github()
            .repository_health(self.crew.config().ci.actions_enabled)
            .await
            .context("Failed to assess health")?;

        println!(
            "\n{} {}",
            "Repository Health Score:".bold(),
            score_colored(health.score, &format!("{}/100", health.score))
        );
        println!(
            "{} {}",
            "Assessment:".bold(),
            score_colored(health.score, &health.assessment.to_string())
        );

        let mut metrics = Table::new(["Metric", "Value"]).titled("Health Metrics");
        metrics
            .row(["Recent Workflow Failures".to_string(), health.recent_workflow_failures.to_string()])
            .row(["Open Critical Issues".to_string(), health.open_critical_issues.to_string()]);
        if let Some(stats) = &health.stats {
            metrics
                .row(["Open Issues".to_string(), stats.open_issues.to_string()])
                .row(["Default Branch".to_string(), stats.default_branch.clone()]);
        }
        println!();
        metrics.print();
        Ok(())
    }

    fn show_team(&self) {
        let team = &self.crew.project().team_members;
        if team.is_empty() {
            println!("👥 No team members configured. Set TEAM_MEMBERS.");
            return;
        }
        println!("\n{}", format!("Team Members ({}):", team.len()).bold());
        for (i, member) in team.iter().enumerate() {
            println!("  {}. {}", i + 1, format!("@{}", member).cyan());
        }
    }

    fn show_history(&self, all: bool) -> Result<()> {
        let summary = if all {
            let Some(path) = self.crew.config().history_path() else {
                println!("📝 No audit log location available.");
                return Ok(());
            };
            let records = read_history(&path).context("Failed to read the audit log")?;
            InteractionSummary::from_records(&records)
        } else {
            self.crew.gate().summary()
        };

        if summary.total == 0 {
            println!("📝 No human interactions recorded yet.");
            return Ok(());
        }
        println!("\n{} {}", "Total Interactions:".bold(), summary.total);
        for table in history_tables(&summary) {
            println!();
            table.print();
        }
        Ok(())
    }
}

fn score_color(score: u32) -> Color {
    if score >= 80 {
        Color::Green
    } else if score >= 50 {
        Color::Yellow
    } else {
        Color::Red
    }
}

fn score_colored(score: u32, text: &str) -> ColoredString {
    text.color(score_color(score))
}

fn help_table() -> Table {
    let mut table = Table::new(["Command", "Description"]).titled("Available Commands");
    for (command, description) in [
        ("help", "Show this help message"),
        ("status", "Show current project status from GitHub Projects"),
        ("standup", "Generate and post daily standup report"),
        ("monitor", "Run monitoring and risk assessment"),
        ("plan <brief>", "Plan a new feature or project"),
        ("project", "Show detailed project information"),
        ("workflows", "Show recent GitHub Actions workflow runs"),
        ("health", "Show repository health metrics"),
        ("team", "Show team member information"),
        ("config", "Show current configuration"),
        ("history [all]", "Show approval history for this session, or the whole audit log"),
        ("exit/quit/q", "Exit interactive mode"),
    ] {
        table.row([command, description]);
    }
    table
}

/// Status breakdown and the first few board items
fn status_tables(snapshot: &ProjectSnapshot) -> Vec<Table> {
    let mut tables = Vec::new();

    let mut breakdown = Table::new(["Status", "Count"]).titled("Status Breakdown");
    for (status, count) in snapshot.status_counts() {
        breakdown.row([status, count.to_string()]);
    }
    if !breakdown.is_empty() {
        tables.push(breakdown);
    }

    let mut recent = Table::new(["Type", "Number", "Title", "Status"]).titled("Recent Items");
    for item in snapshot.items.iter().take(RECENT_ITEMS) {
        recent.row([
            item.item_type.clone(),
            item.number.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string()),
            display::truncate(&item.title, TITLE_WIDTH),
            item.status().to_string(),
        ]);
    }
    if !recent.is_empty() {
        tables.push(recent);
    }
    tables
}

fn project_table(project: &ProjectContext) -> Table {
    let or_unset = |s: &str| if s.is_empty() { "Not set".to_string() } else { s.to_string() };
    let mut table = Table::new(["Field", "Value"]).titled("Project Details");
    table
        .row(["Project Name".to_string(), project.project_name.clone()])
        .row(["Description".to_string(), or_unset(&project.project_description)])
        .row(["Repository".to_string(), project.repository.clone()])
        .row([
            "Current Sprint".to_string(),
            or_unset(project.current_sprint.as_deref().unwrap_or_default()),
        ])
        .row(["Team Members".to_string(), or_unset(&project.team_members.join(", "))])
        .row(["Slack Channel".to_string(), project.slack_channel.clone()]);
    if let Some(id) = &project.github_project_id {
        table.row(["GitHub Project ID".to_string(), id.clone()]);
    }
    table
}

fn workflow_table(runs: &[WorkflowRun]) -> Table {
    let mut table = Table::new(["Name", "Status", "Conclusion", "Branch", "SHA", "Actor"]).titled("Recent Workflow Runs");
    for run in runs {
        table.row([
            run.name.clone(),
            run.status.clone(),
            run.conclusion.clone().unwrap_or_else(|| "N/A".to_string()),
            run.head_branch.clone(),
            run.head_sha.chars().take(8).collect(),
            run.triggering_actor.clone(),
        ]);
    }
    table
}

/// Effective settings; secrets are shown only as present or missing
pub fn config_table(config: &Config) -> Table {
    let or_unset = |v: Option<&str>| v.filter(|s| !s.is_empty()).unwrap_or("Not set").to_string();
    let secret = |env: &str| {
        let state = if std::env::var(env).is_ok_and(|v| !v.trim().is_empty()) {
            "set"
        } else {
            "missing"
        };
        format!("{} ({})", env, state)
    };
    let threshold = config
        .approval
        .auto_approve_threshold
        .map(|r| r.to_string())
        .unwrap_or_else(|| "none".to_string());
    let timeout = config
        .approval
        .timeout()
        .map(|t| format!("{}s", t.as_secs()))
        .unwrap_or_else(|| "none".to_string());

    let team = config.project.team_members.join(", ");

    let mut table = Table::new(["Setting", "Value"]).titled("Current Configuration");
    for (key, value) in [
        ("Project Name", or_unset(Some(config.project.name.as_str()))),
        ("OpenAI Model", config.llm.model.clone()),
        ("OpenAI Key", secret(&config.llm.api_key_env)),
        ("GitHub Repo", config.repository()),
        ("GitHub Token", secret(&config.github.token_env)),
        ("GitHub Project ID", or_unset(config.github.project_id.as_deref())),
        ("Current Sprint", or_unset(config.project.current_sprint.as_deref())),
        ("Slack Channel", config.slack.channel.clone()),
        ("Slack Token", secret(&config.slack.token_env)),
        ("Team Members", or_unset(Some(team.as_str()))),
        ("Human Approval Required", config.approval.required.to_string()),
        ("Interactive Mode", config.approval.interactive.to_string()),
        ("Auto-approve Threshold", threshold),
        ("Approval Timeout", timeout),
        (
            "Max Execution Time",
            match config.agent.max_execution_time() {
                Some(limit) => format!("{}s", limit.as_secs()),
                None => "none".to_string(),
            },
        ),
    ] {
        table.row([key.to_string(), value]);
    }
    table
}

fn history_tables(summary: &InteractionSummary) -> Vec<Table> {
    let mut by_status = Table::new(["Status", "Count"]).titled("Interaction Status Breakdown");
    for (status, count) in &summary.status_breakdown {
        by_status.row([status.to_string(), count.to_string()]);
    }

    let mut recent = Table::new(["Time", "Action", "Risk", "Status"]).titled("Recent Interactions");
    for record in &summary.recent {
        recent.row(history_row(record));
    }
    vec![by_status, recent]
}

fn history_row(record: &InteractionRecord) -> [String; 4] {
    let status = if record.auto {
        format!("{} (auto)", record.status)
    } else {
        record.status.to_string()
    };
    [
        record.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        record.action_type.clone(),
        record.risk_level.to_string(),
        status,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{ApprovalStatus, RiskLevel};
    use crate::console::ScriptedInput;
    use crate::crew::test_support::{config, crew_with, strict};
    use crate::github::ProjectItem;
    use crate::llm::client::mock::MockLlmClient;
    use chrono::{TimeZone, Utc};
    use mockito::Server;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("   "), None);
        assert_eq!(parse_command("STATUS"), Some(ReplCommand::Status));
        assert_eq!(parse_command("q"), Some(ReplCommand::Exit));
        assert_eq!(parse_command("Quit"), Some(ReplCommand::Exit));
        assert_eq!(
            parse_command("PLAN Add OAuth Login"),
            Some(ReplCommand::Plan("Add OAuth Login".to_string()))
        );
        assert_eq!(parse_command("plan"), Some(ReplCommand::Plan(String::new())));
        assert_eq!(parse_command("history all"), Some(ReplCommand::History { all: true }));
        assert_eq!(parse_command("history"), Some(ReplCommand::History { all: false }));
        assert_eq!(parse_command("dance"), Some(ReplCommand::Unknown("dance".to_string())));
    }

    fn item(n: u64, title: &str, status: Option<&str>) -> ProjectItem {
        let mut fields = BTreeMap::new();
        if let Some(status) = status {
            fields.insert("Status".to_string(), status.to_string());
        }
        ProjectItem {
            id: format!("PVTI_{}", n),
            item_type: "issue".into(),
            number: Some(n),
            title: title.into(),
            state: Some("OPEN".into()),
            is_draft: false,
            fields,
        }
    }

    #[test]
    fn test_status_tables() {
        let long = "A very long item title that keeps going well past the fifty character mark";
        let mut items = vec![item(1, long, Some("Todo")), item(2, "Short", None)];
        items.extend((3..=7).map(|n| item(n, "More", Some("Done"))));
        let snapshot = ProjectSnapshot {
            title: "Roadmap".into(),
            items,
        };

        let tables = status_tables(&snapshot);
        assert_eq!(tables.len(), 2);
        let breakdown = tables[0].render();
        assert!(breakdown.contains("Todo       1"));
        assert!(breakdown.contains("No Status  1"));
        assert!(breakdown.contains("Done       5"));

        let recent = tables[1].render();
        assert_eq!(recent.lines().count(), 2 + 1 + RECENT_ITEMS);
        assert!(recent.contains(&format!("{}...", &long[..50])));
    }

    #[test]
    fn test_project_table_marks_unset() {
        let ctx = config().project_context();
        let rendered = project_table(&ctx).render();
        assert!(rendered.contains("Repository      acme/widgets"));
        assert!(rendered.contains("Current Sprint  Not set"));
        assert!(!rendered.contains("GitHub Project ID"));
    }

    #[test]
    fn test_history_row() {
        let record = InteractionRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 15).unwrap(),
            action_type: "daily_standup".into(),
            risk_level: RiskLevel::Low,
            status: ApprovalStatus::Approved,
            description: "Post standup".into(),
            auto: true,
            feedback: None,
        };
        assert_eq!(
            history_row(&record),
            [
                "2024-05-02 09:30:15".to_string(),
                "daily_standup".to_string(),
                "low".to_string(),
                "approved (auto)".to_string()
            ]
        );
    }

    #[test]
    fn test_score_thresholds() {
        assert_eq!(score_color(100), Color::Green);
        assert_eq!(score_color(80), Color::Green);
        assert_eq!(score_color(79), Color::Yellow);
        assert_eq!(score_color(50), Color::Yellow);
        assert_eq!(score_color(49), Color::Red);
    }

    #[tokio::test]
    async fn test_session_runs_until_exit() {
        let server = Server::new_async().await;
        let input = Arc::new(ScriptedInput::new(["", "team", "PLAN", "bogus", "exit", "help"]));
        let crew = crew_with(
            config(),
            &server.url(),
            Arc::new(MockLlmClient::with_text(&[])),
            input.clone(),
            strict(),
        );

        run_session(&crew, input.clone()).await;

        // `help` after `exit` is never read
        assert_eq!(input.remaining(), 1);
        assert!(input.prompts().iter().all(|p| p == PROMPT));
    }

    #[tokio::test]
    async fn test_session_survives_interrupt_and_command_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/actions/runs")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body(r#"{"message": "boom"}"#)
            .create_async()
            .await;
        let input = Arc::new(ScriptedInput::new(["workflows"]).then_interrupt());
        let crew = crew_with(
            config(),
            &server.url(),
            Arc::new(MockLlmClient::with_text(&[])),
            input.clone(),
            strict(),
        );

        // interrupt redraws the prompt; end of input then closes the session
        run_session(&crew, input.clone()).await;
        assert_eq!(input.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_plan_keeps_session_alive() {
        let server = Server::new_async().await;
        let llm = Arc::new(MockLlmClient::with_text(&[]));
        let input = Arc::new(ScriptedInput::new(["plan Add SSO", "r", "later", "history", "q"]));
        let crew = crew_with(config(), &server.url(), llm.clone(), input.clone(), strict());

        run_session(&crew, input.clone()).await;

        assert_eq!(llm.call_count(), 0);
        assert_eq!(input.remaining(), 0);
        let summary = crew.gate().summary();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.recent[0].status, ApprovalStatus::Rejected);
    }

    async fn run_session(crew: &Crew, input: Arc<ScriptedInput>) {
        let mut session = ReplSession::new(crew, input);
        session.run().await.unwrap();
    }
}
