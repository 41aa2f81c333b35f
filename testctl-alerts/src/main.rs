mod routes;

use std::sync::Arc;
use std::time::Duration;

use testctl_core::alerts::{AlertEngine, AlertRule, ConsoleChannel, EmailChannel, FileChannel, NotificationChannel, SlackChannel, WebhookChannel};
use testctl_core::contracts::Channel;
use testctl_core::TestctlConfig;

const PORT_OFFSET: u16 = 5;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("testctl_alerts=info".parse().unwrap()))
        .init();

    let config = TestctlConfig::load_or_default("testctl.toml");
    let notification = &config.notification;

    let channels = build_channels(&config);
    let engine = Arc::new(AlertEngine::new(channels, notification.max_retries));

    if notification.alert_detection.enabled {
        let default_channels: Vec<Channel> = notification
            .notification_channels
            .iter()
            .filter_map(|name| parse_channel(name))
            .collect();
        let mut rule = AlertRule::quality_gate(
            "default-quality-gate",
            notification.alert_detection.min_quality_score,
            notification.alert_detection.max_failure_rate,
        );
        rule.cooldown = chrono::Duration::minutes(notification.cooldown_minutes as i64);
        rule.max_notifications_per_hour = notification.max_notifications_per_hour;
        rule = rule.with_recipients(vec!["ops@testctl.local".to_string()], default_channels);
        engine.add_rule(rule);
    }

    engine.spawn_delivery_worker(Duration::from_secs(5));
    engine.spawn_cleanup_worker(Duration::from_secs(3600));

    let state = Arc::new(routes::AppState { engine });

    let port = config.orchestration.services_base_port + PORT_OFFSET;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|error| panic!("failed to bind port {port}: {error}"));
    tracing::info!(%port, "testctl-alerts listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

fn build_channels(config: &TestctlConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let notification = &config.notification;
    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(ConsoleChannel)];
    channels.push(Arc::new(FileChannel::new(notification.log_directory.clone())));
    if notification.slack.enabled {
        channels.push(Arc::new(SlackChannel::new(reqwest::Client::new(), notification.slack.clone())));
    }
    if notification.webhook.enabled {
        channels.push(Arc::new(WebhookChannel::new(reqwest::Client::new(), notification.webhook.clone())));
    }
    if notification.email.enabled {
        match EmailChannel::new(notification.email.clone(), &notification.email.from_address) {
            Ok(channel) => channels.push(Arc::new(channel)),
            Err(error) => tracing::warn!(%error, "email channel disabled: invalid from_address"),
        }
    }
    channels
}

fn parse_channel(name: &str) -> Option<Channel> {
    match name {
        "email" => Some(Channel::Email),
        "slack" => Some(Channel::Slack),
        "webhook" => Some(Channel::Webhook),
        "console" => Some(Channel::Console),
        "file" => Some(Channel::File),
        _ => None,
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    tracing::info!("shutdown signal received");
}
