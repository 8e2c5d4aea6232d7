//! GitHub integration: issues, pull requests, Actions, Projects v2, and the
//! health and risk views built on top of them.

mod client;
mod error;
pub mod health;
pub mod risk;
mod types;

pub use client::GitHubClient;
pub use error::GitHubError;
pub use health::{HealthAssessment, HealthReport};
pub use risk::{DEFAULT_RISK_TERMS, default_terms};
pub use types::{
    Commit, CreateIssueParams, FlagKind, Issue, IssueQuery, IssueState, IssueType, Priority, ProjectItem,
    ProjectSnapshot, PullRequest, PullRequestParams, RepositoryStats, RiskFlag, UpdateIssueParams, WorkflowRun,
};
