mod routes;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use testctl_core::aggregator::Aggregator;
use testctl_core::alerts::{AlertEngine, ConsoleChannel, EmailChannel, FileChannel, NotificationChannel, SlackChannel, WebhookChannel};
use testctl_core::api_tester::ApiTester;
use testctl_core::browser_tester::{BrowserTester, BrowserTesterConfig};
use testctl_core::event_bus::EventBus;
use testctl_core::orchestrator::Orchestrator;
use testctl_core::quality_judge::{HttpJudge, Judge, QualityJudge};
use testctl_core::TestctlConfig;

const PORT_OFFSET: u16 = 4;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("testctl_orchestrator=info".parse().unwrap()))
        .init();

    let config = TestctlConfig::load_or_default("testctl.toml");

    let api_tester = Arc::new(ApiTester::new(
        Duration::from_secs(config.api_testing.default_timeout_seconds),
        config.api_testing.retry_delay_seconds,
    ));

    let browser = &config.browser_automation;
    let browser_tester = Arc::new(BrowserTester::new(BrowserTesterConfig {
        max_concurrent_contexts: browser.max_concurrent_contexts as usize,
        headless: browser.headless,
        screenshots_dir: PathBuf::from(browser.screenshots_dir.clone()),
        response_time_threshold_ms: browser.default_timeout_ms as f64,
    }));

    let ai_quality = &config.ai_quality;
    let judges: Vec<Arc<dyn Judge>> = ai_quality
        .default_models
        .iter()
        .zip(ai_quality.judge_endpoints.iter())
        .map(|(model, endpoint)| -> Arc<dyn Judge> {
            Arc::new(HttpJudge::new(endpoint.clone(), model.clone(), Duration::from_secs(ai_quality.timeout_seconds)))
        })
        .collect();
    let quality_judge = if judges.is_empty() {
        tracing::warn!("no judges configured; AI quality phases will report a configuration failure");
        None
    } else {
        Some(Arc::new(QualityJudge::new(judges, ai_quality.cache_ttl_seconds)))
    };

    let aggregator = Arc::new(Aggregator::new(config.results_aggregation.clone()));

    let channels = build_channels(&config);
    let alert_engine = Arc::new(AlertEngine::new(channels, config.notification.max_retries));
    alert_engine.spawn_delivery_worker(Duration::from_secs(5));
    alert_engine.spawn_cleanup_worker(Duration::from_secs(3600));

    let event_bus = Arc::new(EventBus::default());
    aggregator.spawn_event_bus_listener(&event_bus);

    let orchestrator = Arc::new(
        Orchestrator::new(
            Some(api_tester),
            Some(browser_tester),
            quality_judge,
            aggregator,
            alert_engine,
            event_bus,
            config.orchestration.quality_threshold,
        )
        .with_auth_headers(config.api_testing.auth_headers()),
    );

    let state = Arc::new(routes::AppState { orchestrator });

    let port = config.orchestration.services_base_port + PORT_OFFSET;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|error| panic!("failed to bind port {port}: {error}"));
    tracing::info!(%port, "testctl-orchestrator listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

fn build_channels(config: &TestctlConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(ConsoleChannel)];
    channels.push(Arc::new(FileChannel::new(config.notification.log_directory.clone())));
    if config.notification.slack.enabled {
        channels.push(Arc::new(SlackChannel::new(reqwest::Client::new(), config.notification.slack.clone())));
    }
    if config.notification.webhook.enabled {
        channels.push(Arc::new(WebhookChannel::new(reqwest::Client::new(), config.notification.webhook.clone())));
    }
    if config.notification.email.enabled {
        match EmailChannel::new(config.notification.email.clone(), &config.notification.email.from_address) {
            Ok(channel) => channels.push(Arc::new(channel)),
            Err(error) => tracing::warn!(%error, "email channel disabled: invalid from_address"),
        }
    }
    channels
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    tracing::info!("shutdown signal received");
}
