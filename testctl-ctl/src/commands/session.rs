use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde_json::Value;
use testctl_core::contracts::{Environment, TestScenario};
use uuid::Uuid;

use crate::{AppError, OutputFormat, Result};

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Start a session from a JSON file containing an array of scenarios.
    Start(StartArgs),
    /// Poll a session's current composite verdict and phase statuses.
    Status(StatusArgs),
    /// Request cancellation of a running session.
    Cancel(StatusArgs),
}

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Path to a JSON file holding an array of `TestScenario` objects.
    pub scenarios_file: PathBuf,
    /// Test environment the session runs under.
    #[arg(long, value_enum, default_value = "test")]
    pub environment: EnvironmentArg,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum EnvironmentArg {
    Test,
    Staging,
    Production,
    Debug,
}

impl From<EnvironmentArg> for Environment {
    fn from(value: EnvironmentArg) -> Self {
        match value {
            EnvironmentArg::Test => Environment::Test,
            EnvironmentArg::Staging => Environment::Staging,
            EnvironmentArg::Production => Environment::Production,
            EnvironmentArg::Debug => Environment::Debug,
        }
    }
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    pub session_id: Uuid,
}

pub async fn dispatch(orchestrator_url: &str, format: OutputFormat, command: SessionCommands) -> Result<()> {
    let client = reqwest::Client::new();
    match command {
        SessionCommands::Start(args) => start(&client, orchestrator_url, format, args).await,
        SessionCommands::Status(args) => status(&client, orchestrator_url, format, args.session_id).await,
        SessionCommands::Cancel(args) => cancel(&client, orchestrator_url, args.session_id).await,
    }
}

async fn start(client: &reqwest::Client, orchestrator_url: &str, format: OutputFormat, args: StartArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.scenarios_file)?;
    let scenarios: Vec<TestScenario> = serde_json::from_str(&raw)?;

    let body = serde_json::json!({
        "scenarios": scenarios,
        "environment": Environment::from(args.environment),
        "metadata": HashMap::<String, Value>::new(),
    });
    let url = format!("{}/sessions", orchestrator_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|source| AppError::Request { url: url.clone(), source })?;
    handle_response(response, "orchestrator", &url, format).await
}

async fn status(client: &reqwest::Client, orchestrator_url: &str, format: OutputFormat, session_id: Uuid) -> Result<()> {
    let url = format!("{}/sessions/{session_id}", orchestrator_url.trim_end_matches('/'));
    let response = client.get(&url).send().await.map_err(|source| AppError::Request { url: url.clone(), source })?;
    handle_response(response, "orchestrator", &url, format).await
}

async fn cancel(client: &reqwest::Client, orchestrator_url: &str, session_id: Uuid) -> Result<()> {
    let url = format!("{}/sessions/{session_id}/cancel", orchestrator_url.trim_end_matches('/'));
    let response = client.post(&url).send().await.map_err(|source| AppError::Request { url: url.clone(), source })?;
    if response.status().is_success() {
        println!("cancellation requested for session {session_id}");
        Ok(())
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::ServiceError { service: "orchestrator", url, status, body })
    }
}

async fn handle_response(response: reqwest::Response, service: &'static str, url: &str, format: OutputFormat) -> Result<()> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(AppError::ServiceError { service, url: url.to_string(), status, body });
    }
    match format {
        OutputFormat::Json => {
            let value: Value = serde_json::from_str(&body)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => println!("{body}"),
    }
    Ok(())
}
