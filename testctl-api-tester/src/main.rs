mod routes;

use std::sync::Arc;
use std::time::Duration;

use testctl_core::api_tester::ApiTester;
use testctl_core::TestctlConfig;

const PORT_OFFSET: u16 = 0;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("testctl_api_tester=info".parse().unwrap()))
        .init();

    let config = TestctlConfig::load_or_default("testctl.toml");
    let tester = ApiTester::new(
        Duration::from_secs(config.api_testing.default_timeout_seconds),
        config.api_testing.retry_delay_seconds,
    );
    let state = Arc::new(routes::AppState { tester });

    let port = config.orchestration.services_base_port + PORT_OFFSET;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|error| panic!("failed to bind port {port}: {error}"));
    tracing::info!(%port, "testctl-api-tester listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    tracing::info!("shutdown signal received");
}
