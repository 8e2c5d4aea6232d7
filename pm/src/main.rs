//! pmagent - project management assistant
//!
//! CLI entry point for the planning, reporting and monitoring workflows.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use pmagent::cli::{Cli, Command, generate_after_help};
use pmagent::config::Config;
use pmagent::console::{self, Console, LineSource};
use pmagent::crew::Crew;
use pmagent::display::{print_full_outcome, print_outcome};
use pmagent::github::GitHubClient;
use pmagent::llm::{self, LlmClient};
use pmagent::repl::{self, config_table};
use pmagent::slack::SlackClient;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pmagent")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("pmagent.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(repository = %config.repository(), "pmagent loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    let result = match cli.command {
        Some(Command::Plan { brief, verbose }) => cmd_plan(config, &brief, verbose).await,
        Some(Command::Standup) => cmd_standup(config).await,
        Some(Command::Monitor) => cmd_monitor(config).await,
        Some(Command::SprintReport { name }) => cmd_sprint_report(config, name.as_deref()).await,
        Some(Command::RunAll { brief }) => cmd_run_all(config, brief.as_deref()).await,
        Some(Command::Interactive) => cmd_interactive(config).await,
        Some(Command::Config) => cmd_config(&config),
        Some(Command::Test) => cmd_test(&config).await,
        Some(Command::Webhook { event, payload }) => cmd_webhook(config, &event, &payload).await,
        None if config.approval.interactive => {
            debug!("main: no command, interactive mode enabled");
            cmd_interactive(config).await
        }
        None => {
            debug!("main: no command, printing help");
            Cli::command().after_help(generate_after_help()).print_help().map_err(Into::into)
        }
    };
    console::restore_terminal();
    result
}

/// Validate, then open the console and assemble the crew
fn build_crew(config: Config) -> Result<(Crew, Arc<dyn LineSource>)> {
    debug!("build_crew: called");
    config.validate()?;
    let console: Arc<dyn LineSource> = Arc::new(Console::spawn().context("Failed to open the console")?);
    let crew = Crew::from_config(config, console.clone())?;
    Ok((crew, console))
}

fn exit_on_failure(success: bool) {
    if !success {
        debug!("exit_on_failure: workflow did not succeed");
        console::restore_terminal();
        std::process::exit(1);
    }
}

async fn cmd_plan(config: Config, brief: &str, verbose: bool) -> Result<()> {
    debug!(%brief, verbose, "cmd_plan: called");
    let preview: String = brief.chars().take(50).collect();
    println!("{}", format!("🎯 Planning Project: {}", preview).blue().bold());

    let (crew, _console) = build_crew(config)?;
    let outcome = crew.run_planning_workflow(brief).await?;
    print_outcome(&outcome, verbose);
    exit_on_failure(outcome.success);
    Ok(())
}

async fn cmd_standup(config: Config) -> Result<()> {
    debug!("cmd_standup: called");
    println!("{}", "📊 Generating Daily Standup Report".blue().bold());

    let (crew, _console) = build_crew(config)?;
    let outcome = crew.run_daily_standup().await?;
    print_outcome(&outcome, crew.config().agent.verbose);
    exit_on_failure(outcome.success);
    Ok(())
}

async fn cmd_monitor(config: Config) -> Result<()> {
    debug!("cmd_monitor: called");
    println!("{}", "🔍 Running System Monitoring Check".blue().bold());

    let (crew, _console) = build_crew(config)?;
    let outcome = crew.run_monitoring_check().await?;
    print_outcome(&outcome, crew.config().agent.verbose);
    exit_on_failure(outcome.success);
    Ok(())
}

async fn cmd_sprint_report(config: Config, name: Option<&str>) -> Result<()> {
    debug!(?name, "cmd_sprint_report: called");
    println!("{}", "🏃 Generating Sprint Report".blue().bold());

    let (crew, _console) = build_crew(config)?;
    let outcome = crew.run_sprint_report(name).await?;
    print_outcome(&outcome, crew.config().agent.verbose);
    exit_on_failure(outcome.success);
    Ok(())
}

async fn cmd_run_all(config: Config, brief: Option<&str>) -> Result<()> {
    debug!(?brief, "cmd_run_all: called");
    println!("{}", "🚀 Running Complete PM Agent Workflow".blue().bold());

    let (crew, _console) = build_crew(config)?;
    let outcome = crew.run_full_workflow(brief).await;
    print_full_outcome(&outcome);
    exit_on_failure(outcome.overall_success);
    Ok(())
}

async fn cmd_interactive(config: Config) -> Result<()> {
    debug!("cmd_interactive: called");
    let (crew, console) = build_crew(config)?;
    repl::run_interactive(&crew, console).await
}

async fn cmd_webhook(config: Config, event: &str, payload_path: &Path) -> Result<()> {
    debug!(%event, ?payload_path, "cmd_webhook: called");
    let content = fs::read_to_string(payload_path)
        .context(format!("Failed to read webhook payload from {}", payload_path.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&content).context("Webhook payload is not valid JSON")?;

    let (crew, _console) = build_crew(config)?;
    let outcome = crew.handle_github_webhook(event, &payload).await?;
    print_outcome(&outcome, true);
    exit_on_failure(outcome.success);
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    config_table(config).print();
    if let Err(e) = config.validate() {
        println!();
        println!("{}", e.to_string().yellow());
    }
    Ok(())
}

/// Check each service independently and report every result
async fn cmd_test(config: &Config) -> Result<()> {
    debug!("cmd_test: called");
    println!("{}", "🧪 Testing Service Connections".blue().bold());

    let github = match GitHubClient::from_config(&config.github) {
        Ok(client) => client.check_connection().await.map_err(eyre::Report::from),
        Err(e) => Err(e.into()),
    };
    let slack = match SlackClient::from_config(&config.slack) {
        Ok(client) => client.auth_test().await.map_err(eyre::Report::from),
        Err(e) => Err(e.into()),
    };
    let openai = match llm::create_client(&config.llm) {
        Ok(client) => client
            .check_connection()
            .await
            .map(|_| config.llm.model.clone())
            .map_err(eyre::Report::from),
        Err(e) => Err(e.into()),
    };

    let mut all_ok = true;
    for (service, result) in [("GitHub API", github), ("Slack API", slack), ("OpenAI API", openai)] {
        match result {
            Ok(detail) => println!("{} {}: Connected ({})", "✅".green(), service, detail),
            Err(e) => {
                all_ok = false;
                println!("{} {}: {}", "❌".red(), service, e);
            }
        }
    }

    if all_ok {
        println!("\n{}", "All services are operational!".green());
    } else {
        println!("\n{}", "Some services are unreachable.".yellow());
    }
    exit_on_failure(all_ok);
    Ok(())
}
