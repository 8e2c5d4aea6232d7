//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// pmagent - project management assistant for GitHub and Slack
#[derive(Parser)]
#[command(
    name = "pm",
    about = "LLM-assisted project management with a human approval gate",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Plan a new project or feature by breaking it down into issues
    Plan {
        /// Project brief or feature description
        brief: String,

        /// Print the planner's full response
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate and post the daily standup report
    Standup,

    /// Run repository health and risk monitoring
    Monitor,

    /// Summarize a sprint and post it to Slack
    SprintReport {
        /// Sprint name (defaults to CURRENT_SPRINT)
        name: Option<String>,
    },

    /// Run planning (with --brief), standup and monitoring in sequence
    RunAll {
        /// Optional project brief for planning
        #[arg(short, long)]
        brief: Option<String>,
    },

    /// Start the interactive session
    Interactive,

    /// Show the effective configuration
    Config,

    /// Check the connection to GitHub, Slack and OpenAI
    Test,

    /// Process a GitHub webhook payload from a file
    Webhook {
        /// Event name from the X-GitHub-Event header (issues, pull_request, workflow_run, ...)
        event: String,

        /// Path to the JSON payload
        #[arg(value_name = "PAYLOAD")]
        payload: PathBuf,
    },
}

/// Required environment, as (variable, what it is)
const REQUIRED_ENV: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "OpenAI API key"),
    ("GITHUB_TOKEN", "GitHub token"),
    ("GITHUB_OWNER", "repository owner"),
    ("GITHUB_REPO", "repository name"),
    ("PROJECT_NAME", "project name"),
    ("SLACK_BOT_TOKEN", "Slack bot token (or SLACK_WEBHOOK_URL)"),
];

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pmagent")
        .join("logs")
        .join("pmagent.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with environment checks and the log location
pub fn generate_after_help() -> String {
    generate_after_help_with(|key| std::env::var(key).ok())
}

fn generate_after_help_with<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    debug!("generate_after_help: called");
    let present = |key: &str| lookup(key).is_some_and(|v| !v.trim().is_empty());

    let mut help = String::new();
    help.push_str("Environment:\n");
    for (key, what) in REQUIRED_ENV {
        let ok = present(key) || (*key == "SLACK_BOT_TOKEN" && present("SLACK_WEBHOOK_URL"));
        let icon = if ok { "\u{2705}" } else { "\u{274C}" };
        help.push_str(&format!("  {} {:<16} {}\n", icon, key, what));
    }

    help.push('\n');
    help.push_str("Config files: --config, ./.pmagent.yml, ~/.config/pmagent/pmagent.yml\n");
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}
