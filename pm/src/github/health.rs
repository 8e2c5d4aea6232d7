//! Repository health scoring

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::client::GitHubClient;
use super::error::GitHubError;
use super::types::{Issue, IssueQuery, IssueState, RepositoryStats, WorkflowRun};

const FAILURE_PENALTY: u32 = 20;
const CRITICAL_ISSUE_PENALTY: u32 = 30;

/// Coarse reading of the health score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthAssessment {
    Healthy,
    NeedsAttention,
    Critical,
}

impl HealthAssessment {
    pub fn from_score(score: u32) -> Self {
        if score > 80 {
            Self::Healthy
        } else if score > 50 {
            Self::NeedsAttention
        } else {
            Self::Critical
        }
    }
}

impl std::fmt::Display for HealthAssessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::NeedsAttention => write!(f, "Needs Attention"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub score: u32,
    pub recent_workflow_failures: u32,
    pub open_critical_issues: u32,
    pub assessment: HealthAssessment,
    pub stats: Option<RepositoryStats>,
    pub recent_runs: Vec<WorkflowRun>,
}

/// `max(0, 100 - 20 * failures - 30 * open_critical)`
pub fn health_score(failures: u32, open_critical: u32) -> u32 {
    100u32.saturating_sub(
        failures
            .saturating_mul(FAILURE_PENALTY)
            .saturating_add(open_critical.saturating_mul(CRITICAL_ISSUE_PENALTY)),
    )
}

/// Score recent runs and issues
pub fn assess(runs: Vec<WorkflowRun>, issues: &[Issue], stats: Option<RepositoryStats>) -> HealthReport {
    let failures = runs.iter().filter(|r| r.failed()).count() as u32;
    let critical = issues
        .iter()
        .filter(|i| i.is_open() && i.has_label_containing("critical"))
        .count() as u32;
    let score = health_score(failures, critical);

    HealthReport {
        score,
        recent_workflow_failures: failures,
        open_critical_issues: critical,
        assessment: HealthAssessment::from_score(score),
        stats,
        recent_runs: runs,
    }
}

impl GitHubClient {
    /// Health from the 5 latest runs and 10 latest issues
    ///
    /// Run and stats lookups are best effort: a repository without Actions
    /// still gets a score from its issues.
    pub async fn repository_health(&self, include_workflows: bool) -> Result<HealthReport, GitHubError> {
        debug!(include_workflows, "repository_health: called");
        let runs = if include_workflows {
            match self.workflow_runs(None, 5).await {
                Ok(runs) => runs,
                Err(e) => {
                    warn!(error = %e, "repository_health: workflow runs unavailable");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let stats = match self.repository_stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "repository_health: stats unavailable");
                None
            }
        };

        let query = IssueQuery {
            state: IssueState::All,
            limit: 10,
            ..Default::default()
        };
        let issues = self.list_issues(&query).await?;

        let report = assess(runs, &issues, stats);
        debug!(score = report.score, assessment = %report.assessment, "repository_health: done");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn run(conclusion: Option<&str>) -> WorkflowRun {
        WorkflowRun {
            id: 1,
            name: "CI".into(),
            status: "completed".into(),
            conclusion: conclusion.map(String::from),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            head_branch: "main".into(),
            head_sha: "abcd1234".into(),
            url: "u".into(),
            triggering_actor: "bot".into(),
        }
    }

    fn issue(state: &str, labels: &[&str]) -> Issue {
        Issue {
            number: 1,
            title: "t".into(),
            body: None,
            state: state.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            assignees: vec![],
            html_url: "u".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            closed_at: None,
            is_pull_request: false,
        }
    }

    #[test]
    fn test_assessment_boundaries() {
        assert_eq!(HealthAssessment::from_score(100), HealthAssessment::Healthy);
        assert_eq!(HealthAssessment::from_score(81), HealthAssessment::Healthy);
        assert_eq!(HealthAssessment::from_score(80), HealthAssessment::NeedsAttention);
        assert_eq!(HealthAssessment::from_score(51), HealthAssessment::NeedsAttention);
        assert_eq!(HealthAssessment::from_score(50), HealthAssessment::Critical);
        assert_eq!(HealthAssessment::NeedsAttention.to_string(), "Needs Attention");
    }

    #[test]
    fn test_assess_counts_failures_and_open_critical() {
        let runs = vec![run(Some("failure")), run(Some("success")), run(None)];
        let issues = vec![
            issue("open", &["priority:critical"]),
            issue("closed", &["critical"]),
            issue("open", &["bug"]),
        ];
        let report = assess(runs, &issues, None);

        assert_eq!(report.recent_workflow_failures, 1);
        assert_eq!(report.open_critical_issues, 1);
        assert_eq!(report.score, 50);
        assert_eq!(report.assessment, HealthAssessment::Critical);
    }

    proptest! {
        #[test]
        fn prop_score_is_bounded_and_monotone(failures in 0u32..1000, critical in 0u32..1000) {
            let score = health_score(failures, critical);
            prop_assert!(score <= 100);
            prop_assert!(health_score(failures + 1, critical) <= score);
            prop_assert!(health_score(failures, critical + 1) <= score);
            if failures == 0 && critical == 0 {
                prop_assert_eq!(score, 100);
            }
        }
    }
}
