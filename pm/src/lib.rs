//! pmagent - LLM-assisted project management for GitHub and Slack
//!
//! Three agents draft work against a repository: the planner breaks briefs
//! into issues, the reporter writes standups and sprint reports, and the
//! monitor assesses CI health and risk keywords. Every write they propose to
//! GitHub or Slack passes a human approval gate first.
//!
//! # Modules
//!
//! - [`approval`] - Risk levels, the approval gate and its audit history
//! - [`console`] - Operator input shared by the gate and the interactive session
//! - [`config`] - Configuration types, file chain and environment overrides
//! - [`llm`] - LLM client trait and OpenAI implementation
//! - [`github`] - GitHub REST/GraphQL client, health scoring and risk scanning
//! - [`slack`] - Slack client and Block Kit messages
//! - [`prompts`] - Handlebars prompt templates with on-disk overrides
//! - [`agents`] - Planner, reporter and monitor agents
//! - [`crew`] - Workflows that sequence agents, the gate and the integrations
//! - [`repl`] - Interactive session
//! - [`cli`] - Command-line interface

pub mod agents;
pub mod approval;
pub mod cli;
pub mod config;
pub mod console;
pub mod crew;
pub mod display;
pub mod github;
pub mod llm;
pub mod prompts;
pub mod repl;
pub mod slack;

// Re-export commonly used types
pub use approval::{ApprovalGate, ApprovalOutcome, ApprovalPolicy, ApprovalRequest, ApprovalStatus, RiskLevel};
pub use config::{Config, ProjectContext};
pub use console::{Console, LineSource, ScriptedInput};
pub use crew::{Crew, FullWorkflowOutcome, WebhookRoute, WorkflowOutcome};
pub use llm::{LlmClient, LlmError, OpenAIClient, create_client};
