//! Keyword-based risk scanning of recent commits and open issues

use chrono::Utc;
use serde_json::{Map, json};
use tracing::debug;

use super::client::GitHubClient;
use super::error::GitHubError;
use super::types::{Commit, FlagKind, Issue, RiskFlag};
use crate::approval::RiskLevel;

/// Terms scanned when none are given
pub const DEFAULT_RISK_TERMS: &[&str] = &["blocker", "security", "urgent", "critical", "breaking"];

const COMMIT_WINDOW: usize = 50;
const RESULTS_PER_TERM: usize = 10;

/// Severity of a keyword hit
pub fn term_severity(term: &str) -> RiskLevel {
    match term.to_lowercase().as_str() {
        "security" | "critical" | "breaking" => RiskLevel::High,
        _ => RiskLevel::Medium,
    }
}

/// One flag per (commit, term) whose message mentions the term
pub fn commit_flags(commits: &[Commit], terms: &[String]) -> Vec<RiskFlag> {
    let mut flags = Vec::new();
    for commit in commits {
        let message = commit.message.to_lowercase();
        for term in terms {
            if !message.contains(&term.to_lowercase()) {
                continue;
            }
            let mut details = Map::new();
            details.insert("commit_sha".into(), json!(commit.sha));
            details.insert("commit_message".into(), json!(commit.title()));
            details.insert("author".into(), json!(commit.author));
            flags.push(RiskFlag {
                kind: FlagKind::CommitRisk,
                severity: term_severity(term),
                description: format!("Risk keyword '{}' found in commit message", term),
                source: "commit".to_string(),
                source_url: commit.html_url.clone(),
                keyword: term.clone(),
                detected_at: Utc::now(),
                details,
            });
        }
    }
    flags
}

/// One flag per search hit for `term`
pub fn issue_flags(term: &str, issues: &[Issue]) -> Vec<RiskFlag> {
    issues
        .iter()
        .map(|issue| {
            let mut details = Map::new();
            details.insert("number".into(), json!(issue.number));
            details.insert("title".into(), json!(issue.title));
            details.insert("state".into(), json!(issue.state));
            RiskFlag {
                kind: FlagKind::IssueRisk,
                severity: term_severity(term),
                description: format!("Risk keyword '{}' found in issue/PR", term),
                source: if issue.is_pull_request { "pull_request" } else { "issue" }.to_string(),
                source_url: issue.html_url.clone(),
                keyword: term.to_string(),
                detected_at: Utc::now(),
                details,
            }
        })
        .collect()
}

impl GitHubClient {
    /// Scan the last 50 commits and open issues/PRs for risk keywords
    pub async fn scan_for_risk_flags(&self, terms: &[String]) -> Result<Vec<RiskFlag>, GitHubError> {
        debug!(?terms, "scan_for_risk_flags: called");
        let commits = self.recent_commits(COMMIT_WINDOW).await?;
        let mut flags = commit_flags(&commits, terms);

        for term in terms {
            let hits = self
                .search_issues(&format!("is:open {}", term), RESULTS_PER_TERM)
                .await?;
            debug!(%term, hits = hits.len(), "scan_for_risk_flags: search done");
            flags.extend(issue_flags(term, &hits));
        }

        debug!(count = flags.len(), "scan_for_risk_flags: done");
        Ok(flags)
    }
}

/// Default terms as owned strings
pub fn default_terms() -> Vec<String> {
    DEFAULT_RISK_TERMS.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(message: &str) -> Commit {
        Commit {
            sha: "abcd1234".into(),
            message: message.into(),
            author: "alice".into(),
            date: None,
            html_url: "https://github.com/acme/widgets/commit/abcd1234".into(),
        }
    }

    #[test]
    fn test_term_severity() {
        assert_eq!(term_severity("security"), RiskLevel::High);
        assert_eq!(term_severity("Breaking"), RiskLevel::High);
        assert_eq!(term_severity("critical"), RiskLevel::High);
        assert_eq!(term_severity("blocker"), RiskLevel::Medium);
        assert_eq!(term_severity("urgent"), RiskLevel::Medium);
    }

    #[test]
    fn test_commit_flags_case_insensitive_per_term() {
        let commits = vec![
            commit("Fix SECURITY hole\n\nalso a Blocker for release"),
            commit("Refactor tests"),
        ];
        let flags = commit_flags(&commits, &default_terms());

        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].keyword, "blocker");
        assert_eq!(flags[0].severity, RiskLevel::Medium);
        assert_eq!(flags[1].keyword, "security");
        assert_eq!(flags[1].severity, RiskLevel::High);
        assert_eq!(flags[1].details["commit_message"], "Fix SECURITY hole");
        assert_eq!(flags[1].kind, FlagKind::CommitRisk);
    }

    #[tokio::test]
    async fn test_scan_combines_commits_and_search() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/commits")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[{"sha":"1111111122222222","html_url":"https://x/c/1",
                     "commit":{"message":"hotfix: breaking change in API","author":{"name":"bob","date":null}}}]"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/search/issues")
            .match_query(mockito::Matcher::UrlEncoded(
                "q".into(),
                "is:open urgent repo:acme/widgets".into(),
            ))
            .with_status(200)
            .with_body(
                r#"{"items":[{"number":3,"title":"Urgent: prod down","body":null,"state":"open",
                "labels":[],"assignees":[],"html_url":"https://x/i/3",
                "created_at":"2024-05-01T00:00:00Z","updated_at":"2024-05-01T00:00:00Z","closed_at":null}]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/search/issues")
            .match_query(mockito::Matcher::UrlEncoded(
                "q".into(),
                "is:open breaking repo:acme/widgets".into(),
            ))
            .with_status(200)
            .with_body(r#"{"items":[]}"#)
            .create_async()
            .await;

        let client = GitHubClient::new(&server.url(), "t", "acme", "widgets").unwrap();
        let flags = client
            .scan_for_risk_flags(&["urgent".to_string(), "breaking".to_string()])
            .await
            .unwrap();

        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].kind, FlagKind::CommitRisk);
        assert_eq!(flags[0].severity, RiskLevel::High);
        assert_eq!(flags[1].kind, FlagKind::IssueRisk);
        assert_eq!(flags[1].source, "issue");
        assert_eq!(flags[1].source_url, "https://x/i/3");
    }
}
