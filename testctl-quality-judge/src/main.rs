mod routes;

use std::sync::Arc;
use std::time::Duration;

use testctl_core::quality_judge::{HttpJudge, Judge, QualityJudge};
use testctl_core::TestctlConfig;

const PORT_OFFSET: u16 = 2;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("testctl_quality_judge=info".parse().unwrap()))
        .init();

    let config = TestctlConfig::load_or_default("testctl.toml");
    let ai_quality = &config.ai_quality;
    let timeout = Duration::from_secs(ai_quality.timeout_seconds);

    let judges: Vec<Arc<dyn Judge>> = ai_quality
        .default_models
        .iter()
        .zip(ai_quality.judge_endpoints.iter())
        .map(|(model, endpoint)| -> Arc<dyn Judge> { Arc::new(HttpJudge::new(endpoint.clone(), model.clone(), timeout)) })
        .collect();
    if judges.is_empty() {
        tracing::warn!("no judges configured; every /assess call will fail with NoJudgesAvailable");
    }

    let judge = QualityJudge::new(judges, ai_quality.cache_ttl_seconds);
    let state = Arc::new(routes::AppState { judge });

    let port = config.orchestration.services_base_port + PORT_OFFSET;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|error| panic!("failed to bind port {port}: {error}"));
    tracing::info!(%port, "testctl-quality-judge listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    tracing::info!("shutdown signal received");
}
