//! Reporter: daily standups and sprint reports

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{Agent, AgentError, AgentOutput, AgentProfile, AgentSettings};
use crate::config::ProjectContext;
use crate::github::Issue;
use crate::llm::LlmClient;
use crate::prompts::PromptLoader;
use crate::slack::{SprintMetrics, SprintProgress};

pub const PROFILE: AgentProfile = AgentProfile {
    role: "Sprint Reporter",
    goal: "Generate comprehensive daily standup reports and sprint summaries. Track team progress, \
           identify blockers, and communicate status clearly to stakeholders.",
    backstory: "You are a detail-oriented project coordinator who excels at synthesizing information \
                from multiple sources into clear, actionable reports. You understand team dynamics and \
                can identify potential issues before they become blockers.",
    tools: &["list_issues", "get_repository_stats", "send_message"],
};

const MAX_PLANNED: usize = 10;
const MAX_RETRO_NOTES: usize = 5;

fn line(issue: &Issue) -> String {
    format!("#{} {}", issue.number, issue.title)
}

fn is_blocker(issue: &Issue) -> bool {
    issue.has_label_containing("block")
}

/// Story points from a `points:N` or `sp:N` label
fn story_points(issue: &Issue) -> Option<u32> {
    issue.labels.iter().find_map(|label| {
        let lower = label.to_lowercase();
        let value = lower.strip_prefix("points:").or_else(|| lower.strip_prefix("sp:"))?;
        value.trim().parse().ok()
    })
}

/// Standup data collected from GitHub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandupReport {
    pub date: NaiveDate,
    pub completed: Vec<String>,
    pub planned: Vec<String>,
    pub blockers: Vec<String>,
    #[serde(skip)]
    pub progress: SprintProgress,
    pub summary: Option<String>,
}

impl StandupReport {
    /// Closed in the last 24h, open work, and anything labelled as blocked
    ///
    /// Pull requests are ignored.
    pub fn from_issues(issues: &[Issue], now: DateTime<Utc>) -> Self {
        debug!(count = issues.len(), "StandupReport::from_issues: called");
        let since = now - Duration::hours(24);
        let issues: Vec<&Issue> = issues.iter().filter(|i| !i.is_pull_request).collect();

        let completed = issues
            .iter()
            .filter(|i| !i.is_open() && i.closed_at.is_some_and(|t| t >= since))
            .map(|i| line(i))
            .collect();

        let mut open: Vec<&&Issue> = issues.iter().filter(|i| i.is_open()).collect();
        open.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        let planned = open
            .iter()
            .filter(|i| !is_blocker(i))
            .take(MAX_PLANNED)
            .map(|i| line(i))
            .collect();
        let blockers = open.iter().filter(|i| is_blocker(i)).map(|i| line(i)).collect();

        let closed = issues.iter().filter(|i| !i.is_open()).count();
        Self {
            date: now.date_naive(),
            completed,
            planned,
            blockers,
            progress: SprintProgress {
                completed: closed,
                total: issues.len(),
                velocity: None,
            },
            summary: None,
        }
    }
}

/// End-of-sprint data collected from GitHub
#[derive(Debug, Clone, PartialEq)]
pub struct SprintReport {
    pub name: String,
    pub metrics: SprintMetrics,
    pub completed: Vec<String>,
    pub incomplete: Vec<String>,
    pub retrospective: Vec<String>,
    pub summary: Option<String>,
}

impl SprintReport {
    pub fn from_issues(name: impl Into<String>, issues: &[Issue]) -> Self {
        let issues: Vec<&Issue> = issues.iter().filter(|i| !i.is_pull_request).collect();
        let (done, open): (Vec<&Issue>, Vec<&Issue>) = issues.iter().copied().partition(|i| !i.is_open());

        let points: Vec<u32> = done.iter().filter_map(|i| story_points(i)).collect();
        let story_points = (!points.is_empty()).then(|| points.iter().sum::<u32>());
        let completion_rate = (!issues.is_empty()).then(|| done.len() as f64 * 100.0 / issues.len() as f64);

        Self {
            name: name.into(),
            metrics: SprintMetrics {
                completed_stories: Some(done.len()),
                story_points,
                velocity: story_points,
                completion_rate,
            },
            completed: done.iter().map(|i| line(i)).collect(),
            incomplete: open.iter().map(|i| line(i)).collect(),
            retrospective: Vec::new(),
            summary: None,
        }
    }
}

/// Trailing bullet list of a response, at most five entries
pub fn retrospective_notes(text: &str) -> Vec<String> {
    let mut notes: Vec<String> = text
        .lines()
        .rev()
        .skip_while(|l| l.trim().is_empty())
        .map(str::trim)
        .take_while(|l| l.starts_with("- ") || l.starts_with("* "))
        .map(|l| l[2..].trim().to_string())
        .collect();
    notes.reverse();
    notes.truncate(MAX_RETRO_NOTES);
    notes
}

#[derive(Debug)]
pub struct ReporterAgent {
    agent: Agent,
}

impl ReporterAgent {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, settings: AgentSettings) -> Self {
        Self {
            agent: Agent::new(PROFILE, llm, prompts, settings),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Narrative standup summary over the collected data
    pub async fn generate_daily_standup(
        &self,
        report: &StandupReport,
        project: &ProjectContext,
    ) -> Result<AgentOutput, AgentError> {
        debug!(date = %report.date, "generate_daily_standup: called");
        let task = self.agent.render(
            "standup",
            &json!({
                "repository": project.repository,
                "sprint": project.current_sprint,
                "date": report.date.to_string(),
                "completed": report.completed,
                "planned": report.planned,
                "blockers": report.blockers,
                "progress_completed": report.progress.completed,
                "progress_total": report.progress.total,
            }),
        )?;
        self.agent.execute_task(&task, Some(&project.to_map())).await
    }

    /// Sprint analysis; retrospective notes are lifted from the closing bullets
    pub async fn generate_sprint_report(
        &self,
        report: &mut SprintReport,
        project: &ProjectContext,
    ) -> Result<AgentOutput, AgentError> {
        debug!(sprint = %report.name, "generate_sprint_report: called");
        let rate = report
            .metrics
            .completion_rate
            .map(|r| format!("{:.1}", r))
            .unwrap_or_else(|| "0".to_string());
        let task = self.agent.render(
            "sprint-report",
            &json!({
                "sprint_name": report.name,
                "repository": project.repository,
                "completed": report.completed,
                "completed_count": report.completed.len(),
                "incomplete": report.incomplete,
                "incomplete_count": report.incomplete.len(),
                "completion_rate": rate,
            }),
        )?;
        let output = self.agent.execute_task(&task, Some(&project.to_map())).await?;
        report.retrospective = retrospective_notes(&output.response);
        report.summary = Some(output.response.clone());
        Ok(output)
    }
}
