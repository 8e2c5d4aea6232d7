//! GitHub domain types
//!
//! Public types are flattened views of the REST payloads; the `Raw*` structs
//! mirror the wire format and are converted on the way in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::approval::RiskLevel;

/// Issue priority, applied as a `priority:<level>` label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Issue type, applied as a `type:<kind>` label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Bug,
    Feature,
    Epic,
    Story,
    #[default]
    Task,
    Subtask,
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bug => write!(f, "bug"),
            Self::Feature => write!(f, "feature"),
            Self::Epic => write!(f, "epic"),
            Self::Story => write!(f, "story"),
            Self::Task => write!(f, "task"),
            Self::Subtask => write!(f, "subtask"),
        }
    }
}

/// Parameters for a new issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIssueParams {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, alias = "type")]
    pub issue_type: IssueType,
}

impl CreateIssueParams {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: String::new(),
            labels: Vec::new(),
            assignees: Vec::new(),
            milestone: None,
            priority: Priority::default(),
            issue_type: IssueType::default(),
        }
    }

    /// Caller labels plus the priority and type labels, without duplicates
    pub fn all_labels(&self) -> Vec<String> {
        let mut labels = self.labels.clone();
        for extra in [format!("priority:{}", self.priority), format!("type:{}", self.issue_type)] {
            if !labels.contains(&extra) {
                labels.push(extra);
            }
        }
        labels
    }
}

/// Fields to change on an existing issue; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateIssueParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
}

/// Parameters for a new pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestParams {
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub head: String,
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default)]
    pub draft: bool,
}

fn default_base() -> String {
    "main".to_string()
}

/// Issue state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
    All,
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Filter for listing issues
#[derive(Debug, Clone, PartialEq)]
pub struct IssueQuery {
    pub state: IssueState,
    pub labels: Vec<String>,
    pub assignee: Option<String>,
    pub limit: usize,
}

impl Default for IssueQuery {
    fn default() -> Self {
        Self {
            state: IssueState::Open,
            labels: Vec::new(),
            assignee: None,
            limit: 30,
        }
    }
}

/// An issue or pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub is_pull_request: bool,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }

    pub fn has_label_containing(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.labels.iter().any(|l| l.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLabel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawIssue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    #[serde(default)]
    pub assignees: Vec<RawUser>,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pull_request: Option<serde_json::Value>,
}

impl From<RawIssue> for Issue {
    fn from(raw: RawIssue) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            body: raw.body,
            state: raw.state,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            assignees: raw.assignees.into_iter().map(|u| u.login).collect(),
            html_url: raw.html_url,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            closed_at: raw.closed_at,
            is_pull_request: raw.pull_request.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSearch {
    pub items: Vec<RawIssue>,
}

/// A created pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    pub html_url: String,
    #[serde(default)]
    pub draft: bool,
}

/// A commit on the default branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Abbreviated to 8 characters
    pub sha: String,
    /// Full commit message
    pub message: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub html_url: String,
}

impl Commit {
    /// First line of the message
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCommit {
    pub sha: String,
    pub html_url: String,
    pub commit: RawCommitDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCommitDetail {
    pub message: String,
    pub author: Option<RawCommitAuthor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCommitAuthor {
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

impl From<RawCommit> for Commit {
    fn from(raw: RawCommit) -> Self {
        let (author, date) = match raw.commit.author {
            Some(a) => (a.name.unwrap_or_else(|| "unknown".to_string()), a.date),
            None => ("unknown".to_string(), None),
        };
        Self {
            sha: short_sha(&raw.sha),
            message: raw.commit.message,
            author,
            date,
            html_url: raw.html_url,
        }
    }
}

/// Repository metadata and recent activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    #[serde(rename = "stargazers_count")]
    pub stars: u64,
    #[serde(rename = "forks_count")]
    pub forks: u64,
    #[serde(rename = "open_issues_count")]
    pub open_issues: u64,
    pub default_branch: String,
    pub language: Option<String>,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recent_commits: Vec<Commit>,
}

/// A GitHub Actions run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub head_branch: String,
    pub head_sha: String,
    pub url: String,
    pub triggering_actor: String,
}

impl WorkflowRun {
    pub fn failed(&self) -> bool {
        self.conclusion.as_deref() == Some("failure")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRuns {
    pub workflow_runs: Vec<RawRun>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRun {
    pub id: u64,
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub head_branch: Option<String>,
    pub head_sha: String,
    pub html_url: String,
    pub triggering_actor: Option<RawUser>,
}

impl From<RawRun> for WorkflowRun {
    fn from(raw: RawRun) -> Self {
        Self {
            id: raw.id,
            name: raw.name.unwrap_or_default(),
            status: raw.status.unwrap_or_else(|| "unknown".to_string()),
            conclusion: raw.conclusion,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            head_branch: raw.head_branch.unwrap_or_default(),
            head_sha: short_sha(&raw.head_sha),
            url: raw.html_url,
            triggering_actor: raw
                .triggering_actor
                .map(|u| u.login)
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// An item on a Projects v2 board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectItem {
    pub id: String,
    /// `issue`, `pull_request` or `draft_issue`
    pub item_type: String,
    pub number: Option<u64>,
    pub title: String,
    pub state: Option<String>,
    pub is_draft: bool,
    /// Single-select and text field values by field name
    pub fields: BTreeMap<String, String>,
}

impl ProjectItem {
    pub fn status(&self) -> &str {
        self.fields.get("Status").map(String::as_str).unwrap_or("No Status")
    }
}

/// A Projects v2 board and its items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub title: String,
    pub items: Vec<ProjectItem>,
}

impl ProjectSnapshot {
    /// Item count per status, in first-seen order
    pub fn status_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for item in &self.items {
            let status = item.status();
            match counts.iter_mut().find(|(s, _)| s == status) {
                Some((_, n)) => *n += 1,
                None => counts.push((status.to_string(), 1)),
            }
        }
        counts
    }
}

/// Where a risk flag was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    CommitRisk,
    IssueRisk,
}

impl std::fmt::Display for FlagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommitRisk => write!(f, "commit_risk"),
            Self::IssueRisk => write!(f, "issue_risk"),
        }
    }
}

/// A keyword hit in recent activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFlag {
    pub kind: FlagKind,
    pub severity: RiskLevel,
    pub description: String,
    /// `commit`, `issue` or `pull_request`
    pub source: String,
    pub source_url: String,
    pub keyword: String,
    pub detected_at: DateTime<Utc>,
    pub details: serde_json::Map<String, serde_json::Value>,
}

pub(crate) fn short_sha(sha: &str) -> String {
    sha.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_labels_adds_priority_and_type() {
        let mut params = CreateIssueParams::new("Login");
        params.labels = vec!["frontend".into(), "type:task".into()];
        params.priority = Priority::High;

        assert_eq!(params.all_labels(), vec!["frontend", "type:task", "priority:high"]);
    }

    #[test]
    fn test_create_params_accept_type_alias() {
        let params: CreateIssueParams =
            serde_json::from_str(r#"{"title":"Epic","type":"epic","priority":"critical"}"#).unwrap();

        assert_eq!(params.issue_type, IssueType::Epic);
        assert_eq!(params.priority, Priority::Critical);
        assert!(params.body.is_empty());
    }

    #[test]
    fn test_raw_issue_conversion() {
        let raw: RawIssue = serde_json::from_str(
            r#"{"number":7,"title":"Crash","body":null,"state":"open",
                "labels":[{"name":"Critical"}],"assignees":[{"login":"alice"}],
                "html_url":"https://github.com/a/b/issues/7",
                "created_at":"2024-01-01T00:00:00Z","updated_at":"2024-01-02T00:00:00Z",
                "closed_at":null,"pull_request":{"url":"x"}}"#,
        )
        .unwrap();
        let issue = Issue::from(raw);

        assert_eq!(issue.labels, vec!["Critical"]);
        assert_eq!(issue.assignees, vec!["alice"]);
        assert!(issue.is_pull_request);
        assert!(issue.has_label_containing("critical"));
    }

    #[test]
    fn test_commit_title_and_short_sha() {
        let raw: RawCommit = serde_json::from_str(
            r#"{"sha":"0123456789abcdef","html_url":"u",
                "commit":{"message":"Fix auth\n\nlong body","author":{"name":"Bob","date":"2024-03-01T10:00:00Z"}}}"#,
        )
        .unwrap();
        let commit = Commit::from(raw);

        assert_eq!(commit.sha, "01234567");
        assert_eq!(commit.title(), "Fix auth");
        assert_eq!(commit.author, "Bob");
    }

    #[test]
    fn test_status_counts() {
        let item = |status: Option<&str>| ProjectItem {
            id: "i".into(),
            item_type: "issue".into(),
            number: Some(1),
            title: "t".into(),
            state: None,
            is_draft: false,
            fields: status
                .map(|s| BTreeMap::from([("Status".to_string(), s.to_string())]))
                .unwrap_or_default(),
        };
        let snapshot = ProjectSnapshot {
            title: "Board".into(),
            items: vec![item(Some("Todo")), item(Some("Done")), item(Some("Todo")), item(None)],
        };

        assert_eq!(
            snapshot.status_counts(),
            vec![("Todo".to_string(), 2), ("Done".to_string(), 1), ("No Status".to_string(), 1)]
        );
    }
}
