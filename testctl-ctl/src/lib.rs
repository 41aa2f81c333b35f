//! `testctl-ctl` — the operator-facing control interface for the testing
//! platform: scenario authoring against the local `ScenarioManager` store,
//! and session/alert control against the running orchestrator and alert
//! services over HTTP (§6).

mod commands;

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use commands::alert::{self, AlertCommands};
use commands::scenario::{self, ScenarioCommands};
use commands::session::{self, SessionCommands};
use testctl_core::scenario_manager::ScenarioManagerError;
use thiserror::Error;
use tokio::runtime::Builder;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("scenario store error: {0}")]
    Scenario(#[from] ScenarioManagerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("{service} at {url} returned {status}: {body}")]
    ServiceError { service: &'static str, url: String, status: reqwest::StatusCode, body: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "testctl operator control interface", long_about = None)]
pub struct Cli {
    /// Directory holding scenario and collection JSON files.
    #[arg(long, default_value = "scenarios")]
    pub storage_dir: PathBuf,
    /// Base URL of the orchestrator service.
    #[arg(long, default_value = "http://localhost:8004")]
    pub orchestrator_url: String,
    /// Base URL of the alerts service.
    #[arg(long, default_value = "http://localhost:8005")]
    pub alerts_url: String,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, inspect and generate test scenarios.
    Scenario(ScenarioArgs),
    /// Start, poll and cancel orchestrator sessions.
    Session(SessionArgs),
    /// List and acknowledge/resolve alerts.
    Alert(AlertArgs),
    /// Probe `/health` on a list of service base URLs.
    Health(HealthArgs),
    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args, Debug)]
pub struct ScenarioArgs {
    #[command(subcommand)]
    pub command: ScenarioCommands,
}

#[derive(clap::Args, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommands,
}

#[derive(clap::Args, Debug)]
pub struct AlertArgs {
    #[command(subcommand)]
    pub command: AlertCommands,
}

#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Service base URLs to probe; defaults to the six core services on
    /// their conventional `services_base_port` offsets.
    #[arg(long)]
    pub urls: Vec<String>,
}

pub fn run(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    match cli.command {
        Commands::Scenario(args) => scenario::dispatch(&cli.storage_dir, cli.format, args.command),
        Commands::Session(args) => runtime.block_on(session::dispatch(&cli.orchestrator_url, cli.format, args.command)),
        Commands::Alert(args) => runtime.block_on(alert::dispatch(&cli.alerts_url, cli.format, args.command)),
        Commands::Health(args) => runtime.block_on(health(args)),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "testctl-ctl", &mut std::io::stdout());
            Ok(())
        }
    }
}

async fn health(args: HealthArgs) -> Result<()> {
    let urls = if args.urls.is_empty() { default_health_urls() } else { args.urls };
    let client = reqwest::Client::new();
    for url in urls {
        let endpoint = format!("{}/health", url.trim_end_matches('/'));
        match client.get(&endpoint).send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                println!("{url}: HTTP {status}\n  {body}");
            }
            Err(error) => println!("{url}: unreachable ({error})"),
        }
    }
    Ok(())
}

/// The six HTTP services, each at `services_base_port + PORT_OFFSET`
/// (api_tester=0, browser_tester=1, quality_judge=2, aggregator=3,
/// orchestrator=4, alerts=5) under the default base port of 8000.
fn default_health_urls() -> Vec<String> {
    (8000..=8005).map(|port| format!("http://localhost:{port}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_health_urls_covers_all_six_services() {
        assert_eq!(default_health_urls().len(), 6);
    }
}
