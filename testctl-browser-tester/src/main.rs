mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use testctl_core::browser_tester::{BrowserTester, BrowserTesterConfig};
use testctl_core::TestctlConfig;

const PORT_OFFSET: u16 = 1;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("testctl_browser_tester=info".parse().unwrap()))
        .init();

    let config = TestctlConfig::load_or_default("testctl.toml");
    let browser = config.browser_automation;
    let tester = BrowserTester::new(BrowserTesterConfig {
        max_concurrent_contexts: browser.max_concurrent_contexts as usize,
        headless: browser.headless,
        screenshots_dir: PathBuf::from(browser.screenshots_dir),
        response_time_threshold_ms: browser.default_timeout_ms as f64,
    });
    let state = Arc::new(routes::AppState { tester });

    let port = config.orchestration.services_base_port + PORT_OFFSET;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|error| panic!("failed to bind port {port}: {error}"));
    tracing::info!(%port, "testctl-browser-tester listening");

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    tracing::info!("shutdown signal received");
}
