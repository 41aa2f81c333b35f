mod routes;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use testctl_core::aggregator::Aggregator;
use testctl_core::TestctlConfig;

const PORT_OFFSET: u16 = 3;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("testctl_aggregator=info".parse().unwrap()))
        .init();

    let config = TestctlConfig::load_or_default("testctl.toml");
    let aggregator = Aggregator::new(config.results_aggregation.clone());
    let state = Arc::new(routes::AppState { aggregator, reports: Mutex::new(HashMap::new()) });

    let port = config.orchestration.services_base_port + PORT_OFFSET;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|error| panic!("failed to bind port {port}: {error}"));
    tracing::info!(%port, "testctl-aggregator listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    tracing::info!("shutdown signal received");
}
