//! pmagent configuration types and loading
//!
//! Configuration is layered: built-in defaults, then the first YAML file found
//! in the fallback chain, then environment variable overrides. Secrets are never
//! stored in the file; each integration names the environment variable that
//! holds its token.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::approval::{ApprovalPolicy, RiskLevel};

/// Main pmagent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// GitHub repository and project coordinates
    pub github: GitHubConfig,

    /// Slack delivery configuration
    pub slack: SlackConfig,

    /// Project metadata handed to every agent
    pub project: ProjectConfig,

    /// Human approval gate behavior
    pub approval: ApprovalConfig,

    /// Agent execution limits
    pub agent: AgentConfig,

    /// GitHub Actions integration
    pub ci: CiConfig,

    /// Log level (overridden by --log-level)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Location of the approval audit log (JSONL)
    #[serde(rename = "history-path")]
    pub history_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Read only `log-level` from the first config file in the chain
    ///
    /// Runs before logging exists, so failures are silent; the full load reports them.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::candidate_paths(config_path).into_iter().find_map(|path| {
            let content = fs::read_to_string(&path).ok()?;
            let value: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
            Some(value.get("log-level").and_then(|v| v.as_str()).map(str::to_string))
        })?
    }

    /// Files to try, in order; an explicit path replaces the fallback chain
    fn candidate_paths(config_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = config_path {
            return vec![path.clone()];
        }
        let mut paths = vec![PathBuf::from(".pmagent.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("pmagent").join("pmagent.yml"));
        }
        paths.into_iter().filter(|p| p.exists()).collect()
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local .pmagent.yml, then ~/.config/pmagent/pmagent.yml
        for path in Self::candidate_paths(None) {
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                    eprintln!("Warning: Failed to load config from {}: {:#}", path.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply environment overrides using the given lookup
    ///
    /// Unset variables leave the current value alone. A variable that is set but
    /// cannot be parsed is an error naming the variable.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        debug!("apply_env_from: called");
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // LLM
        if let Some(v) = get("OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }

        // GitHub
        if let Some(v) = get("GITHUB_OWNER") {
            self.github.owner = v;
        }
        if let Some(v) = get("GITHUB_REPO") {
            self.github.repo = v;
        }
        if let Some(v) = get("GITHUB_API_URL") {
            self.github.api_url = v;
        }
        if let Some(v) = get("GITHUB_PROJECT_ID") {
            self.github.project_id = Some(v);
        }
        if let Some(v) = get("GITHUB_PROJECT_NUMBER") {
            self.github.project_number = parse_env("GITHUB_PROJECT_NUMBER", &v)?;
        }

        // Project
        if let Some(v) = get("PROJECT_NAME") {
            self.project.name = v;
        }
        if let Some(v) = get("PROJECT_DESCRIPTION") {
            self.project.description = v;
        }
        if let Some(v) = get("CURRENT_SPRINT") {
            self.project.current_sprint = Some(v);
        }
        if let Some(v) = get("TEAM_MEMBERS") {
            self.project.team_members = split_members(&v);
        }

        // Slack
        if let Some(v) = get("SLACK_CHANNEL") {
            self.slack.channel = v;
        }
        if let Some(v) = get("SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = Some(v);
        }
        if let Some(v) = get("SLACK_API_URL") {
            self.slack.api_url = v;
        }

        // Approval
        if let Some(v) = get("HUMAN_APPROVAL_REQUIRED") {
            self.approval.required = parse_bool("HUMAN_APPROVAL_REQUIRED", &v)?;
        }
        if let Some(v) = get("INTERACTIVE_MODE") {
            self.approval.interactive = parse_bool("INTERACTIVE_MODE", &v)?;
        }
        if let Some(v) = get("APPROVAL_TIMEOUT") {
            self.approval.timeout_secs = parse_env("APPROVAL_TIMEOUT", &v)?;
        }
        if let Some(v) = get("AUTO_APPROVE_THRESHOLD") {
            self.approval.auto_approve_threshold = parse_threshold(&v)?;
        } else if let Some(v) = get("AUTO_APPROVE_LOW_RISK")
            && parse_bool("AUTO_APPROVE_LOW_RISK", &v)?
        {
            self.approval.auto_approve_threshold = Some(RiskLevel::Low);
        }

        // Agent
        if let Some(v) = get("AGENT_VERBOSE") {
            self.agent.verbose = parse_bool("AGENT_VERBOSE", &v)?;
        }
        if let Some(v) = get("MAX_EXECUTION_TIME") {
            self.agent.max_execution_time_secs = parse_env("MAX_EXECUTION_TIME", &v)?;
        }

        // CI
        if let Some(v) = get("GITHUB_ACTIONS_ENABLED") {
            self.ci.actions_enabled = parse_bool("GITHUB_ACTIONS_ENABLED", &v)?;
        }
        if let Some(v) = get("MAIN_WORKFLOW_FILE") {
            self.ci.main_workflow_file = v;
        }
        if let Some(v) = get("DEPLOYMENT_WORKFLOW_FILE") {
            self.ci.deployment_workflow_file = v;
        }

        if let Some(v) = get("PMAGENT_HISTORY_PATH") {
            self.history_path = Some(PathBuf::from(v));
        }

        Ok(())
    }

    /// Validate configuration before running any workflow
    ///
    /// Reports every missing item at once so the operator can fix them in one pass.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(|key| std::env::var(key).ok())
    }

    /// Validate using the given secret lookup
    pub fn validate_with<F>(&self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        debug!("validate_with: called");
        let present = |key: &str| lookup(key).is_some_and(|v| !v.trim().is_empty());
        let mut missing = Vec::new();

        if !present(&self.llm.api_key_env) {
            missing.push(format!("LLM API key ({})", self.llm.api_key_env));
        }
        if !present(&self.github.token_env) {
            missing.push(format!("GitHub token ({})", self.github.token_env));
        }
        if self.github.owner.is_empty() {
            missing.push("GitHub owner (GITHUB_OWNER)".to_string());
        }
        if self.github.repo.is_empty() {
            missing.push("GitHub repository (GITHUB_REPO)".to_string());
        }
        if self.project.name.is_empty() {
            missing.push("project name (PROJECT_NAME)".to_string());
        }
        if !present(&self.slack.token_env) && self.slack.webhook_url.is_none() {
            missing.push(format!(
                "Slack bot token ({}) or webhook URL (SLACK_WEBHOOK_URL)",
                self.slack.token_env
            ));
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(eyre::eyre!("Missing configuration:\n  - {}", missing.join("\n  - ")))
        }
    }

    /// Repository in `owner/repo` form
    pub fn repository(&self) -> String {
        format!("{}/{}", self.github.owner, self.github.repo)
    }

    /// Project context shared with agents and approval requests
    pub fn project_context(&self) -> ProjectContext {
        ProjectContext {
            project_name: self.project.name.clone(),
            project_description: self.project.description.clone(),
            repository: self.repository(),
            github_project_id: self.github.project_id.clone(),
            current_sprint: self.project.current_sprint.clone(),
            team_members: self.project.team_members.clone(),
            slack_channel: self.slack.channel.clone(),
        }
    }

    /// Approval policy derived from the approval section
    pub fn approval_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy {
            approval_required: self.approval.required,
            auto_approve_threshold: self.approval.auto_approve_threshold,
            timeout: self.approval.timeout(),
        }
    }

    /// Resolved audit log path
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_path
            .clone()
            .or_else(|| dirs::data_local_dir().map(|d| d.join("pmagent").join("approvals.jsonl")))
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo-preview".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            timeout_ms: 120_000,
        }
    }
}

/// GitHub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,

    /// Environment variable containing the personal access token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// REST base URL; GraphQL lives at `<api-url>/graphql`
    #[serde(rename = "api-url")]
    pub api_url: String,

    /// Projects v2 node id
    #[serde(rename = "project-id")]
    pub project_id: Option<String>,

    #[serde(rename = "project-number")]
    pub project_number: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            token_env: "GITHUB_TOKEN".to_string(),
            api_url: "https://api.github.com".to_string(),
            project_id: None,
            project_number: 1,
        }
    }
}

/// Slack configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Default channel for updates
    pub channel: String,

    /// Environment variable containing the bot token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Web API base URL
    #[serde(rename = "api-url")]
    pub api_url: String,

    /// Incoming webhook, used when no bot token is available
    #[serde(rename = "webhook-url")]
    pub webhook_url: Option<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            channel: "#pm-updates".to_string(),
            token_env: "SLACK_BOT_TOKEN".to_string(),
            api_url: "https://slack.com/api".to_string(),
            webhook_url: None,
        }
    }
}

/// Project metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub description: String,

    #[serde(rename = "current-sprint")]
    pub current_sprint: Option<String>,

    /// GitHub usernames
    #[serde(rename = "team-members")]
    pub team_members: Vec<String>,
}

/// Approval gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Require a human decision for actions below high risk
    pub required: bool,

    /// Start the interactive session when no subcommand is given
    pub interactive: bool,

    /// Seconds to wait for a decision; 0 waits forever
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Highest risk level approved without asking
    #[serde(rename = "auto-approve-threshold")]
    pub auto_approve_threshold: Option<RiskLevel>,
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            required: true,
            interactive: false,
            timeout_secs: 300,
            auto_approve_threshold: None,
        }
    }
}

/// Agent execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Print agent output as it is produced
    pub verbose: bool,

    /// Seconds an agent call may take; 0 means no limit
    #[serde(rename = "max-execution-time-secs")]
    pub max_execution_time_secs: u64,
}

impl AgentConfig {
    pub fn max_execution_time(&self) -> Option<Duration> {
        (self.max_execution_time_secs > 0).then(|| Duration::from_secs(self.max_execution_time_secs))
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            verbose: true,
            max_execution_time_secs: 300,
        }
    }
}

/// GitHub Actions configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CiConfig {
    #[serde(rename = "actions-enabled")]
    pub actions_enabled: bool,

    #[serde(rename = "main-workflow-file")]
    pub main_workflow_file: String,

    #[serde(rename = "deployment-workflow-file")]
    pub deployment_workflow_file: String,
}

impl Default for CiConfig {
    fn default() -> Self {
        Self {
            actions_enabled: true,
            main_workflow_file: ".github/workflows/ci.yml".to_string(),
            deployment_workflow_file: ".github/workflows/deploy.yml".to_string(),
        }
    }
}

/// Project context handed to agents and attached to approval requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_name: String,
    pub project_description: String,
    pub repository: String,
    pub github_project_id: Option<String>,
    pub current_sprint: Option<String>,
    pub team_members: Vec<String>,
    pub slack_channel: String,
}

impl ProjectContext {
    /// Context as a JSON object for approval requests
    pub fn to_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// Split a comma separated member list, dropping blanks
pub fn split_members(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(eyre::eyre!("Invalid boolean for {}: '{}'", key, other)),
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| eyre::eyre!("Invalid value for {}: '{}'", key, value))
}

fn parse_threshold(value: &str) -> Result<Option<RiskLevel>> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    value
        .parse::<RiskLevel>()
        .map(Some)
        .map_err(|e| eyre::eyre!("Invalid value for AUTO_APPROVE_THRESHOLD: {}", e))
}
