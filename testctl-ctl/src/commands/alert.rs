use clap::{Args, Subcommand};
use serde_json::Value;
use testctl_core::contracts::{AlertPriority, AlertType, Channel};
use uuid::Uuid;

use crate::{AppError, OutputFormat, Result};

#[derive(Subcommand, Debug)]
pub enum AlertCommands {
    /// List currently open (non-resolved) alerts.
    List,
    /// Acknowledge an open alert.
    Acknowledge(AcknowledgeArgs),
    /// Resolve an alert.
    Resolve(IdArgs),
    /// Submit a custom, rule-bypassing alert.
    Send(SendArgs),
}

#[derive(Args, Debug)]
pub struct IdArgs {
    pub id: Uuid,
}

#[derive(Args, Debug)]
pub struct AcknowledgeArgs {
    pub id: Uuid,
    /// Who is acknowledging the alert.
    #[arg(long, default_value = "operator")]
    pub by: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    pub title: String,
    pub message: String,
    /// Recipient address/identifier, repeatable.
    #[arg(long = "recipient", required = true)]
    pub recipients: Vec<String>,
    /// Delivery channel, repeatable: email, slack, webhook, console, file.
    #[arg(long = "channel", required = true)]
    pub channels: Vec<String>,
    #[arg(long, value_enum, default_value = "medium")]
    pub priority: PriorityArg,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
    Critical,
    Urgent,
}

impl From<PriorityArg> for AlertPriority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Low => AlertPriority::Low,
            PriorityArg::Medium => AlertPriority::Medium,
            PriorityArg::High => AlertPriority::High,
            PriorityArg::Critical => AlertPriority::Critical,
            PriorityArg::Urgent => AlertPriority::Urgent,
        }
    }
}

pub async fn dispatch(alerts_url: &str, format: OutputFormat, command: AlertCommands) -> Result<()> {
    let client = reqwest::Client::new();
    match command {
        AlertCommands::List => list(&client, alerts_url, format).await,
        AlertCommands::Acknowledge(args) => acknowledge(&client, alerts_url, args).await,
        AlertCommands::Resolve(args) => resolve(&client, alerts_url, args.id).await,
        AlertCommands::Send(args) => send(&client, alerts_url, format, args).await,
    }
}

async fn list(client: &reqwest::Client, alerts_url: &str, format: OutputFormat) -> Result<()> {
    let url = format!("{}/alerts", alerts_url.trim_end_matches('/'));
    let response = client.get(&url).send().await.map_err(|source| AppError::Request { url: url.clone(), source })?;
    handle_response(response, &url, format).await
}

async fn acknowledge(client: &reqwest::Client, alerts_url: &str, args: AcknowledgeArgs) -> Result<()> {
    let url = format!("{}/alerts/{}/acknowledge", alerts_url.trim_end_matches('/'), args.id);
    let response = client
        .post(&url)
        .json(&serde_json::json!({"acknowledged_by": args.by}))
        .send()
        .await
        .map_err(|source| AppError::Request { url: url.clone(), source })?;
    confirm(response, &url, "acknowledged").await
}

async fn resolve(client: &reqwest::Client, alerts_url: &str, id: Uuid) -> Result<()> {
    let url = format!("{}/alerts/{id}/resolve", alerts_url.trim_end_matches('/'));
    let response = client.post(&url).send().await.map_err(|source| AppError::Request { url: url.clone(), source })?;
    confirm(response, &url, "resolved").await
}

async fn send(client: &reqwest::Client, alerts_url: &str, format: OutputFormat, args: SendArgs) -> Result<()> {
    let channels: Vec<Channel> = args
        .channels
        .iter()
        .map(|name| parse_channel(name))
        .collect::<Result<Vec<_>>>()?;
    let body = serde_json::json!({
        "alert_type": AlertType::Custom,
        "priority": AlertPriority::from(args.priority),
        "title": args.title,
        "message": args.message,
        "recipients": args.recipients,
        "channels": channels,
    });
    let url = format!("{}/alert", alerts_url.trim_end_matches('/'));
    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|source| AppError::Request { url: url.clone(), source })?;
    handle_response(response, &url, format).await
}

fn parse_channel(name: &str) -> Result<Channel> {
    match name {
        "email" => Ok(Channel::Email),
        "slack" => Ok(Channel::Slack),
        "webhook" => Ok(Channel::Webhook),
        "console" => Ok(Channel::Console),
        "file" => Ok(Channel::File),
        other => Err(AppError::InvalidArgument(format!("unknown channel '{other}'"))),
    }
}

async fn confirm(response: reqwest::Response, url: &str, verb: &str) -> Result<()> {
    if response.status().is_success() {
        println!("{verb}");
        Ok(())
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::ServiceError { service: "alerts", url: url.to_string(), status, body })
    }
}

async fn handle_response(response: reqwest::Response, url: &str, format: OutputFormat) -> Result<()> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(AppError::ServiceError { service: "alerts", url: url.to_string(), status, body });
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
