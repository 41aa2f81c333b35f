use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use testctl_core::browser_tester::BrowserTester;
use testctl_core::contracts::{BrowserKind, Environment, TestContext, TestScenario};
use testctl_core::health::HealthStatus;

pub struct AppState {
    pub tester: BrowserTester,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/execute", post(execute))
        .route("/screenshot", post(screenshot))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthStatus::new(testctl_core::browser_tester::SERVICE_NAME))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub scenario: TestScenario,
    #[serde(default = "default_context")]
    pub context: TestContext,
}

fn default_context() -> TestContext {
    TestContext::new(uuid::Uuid::new_v4(), Environment::Test)
}

async fn execute(State(state): State<Arc<AppState>>, Json(request): Json<ExecuteRequest>) -> impl IntoResponse {
    if let Err(error) = request.scenario.validate() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response();
    }
    match state.tester.execute_ui_test(&request.scenario, &request.context).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ScreenshotRequest {
    pub page_url: String,
    #[serde(default)]
    pub browser: BrowserKind,
}

#[derive(Debug, Serialize)]
struct ScreenshotResponse {
    path: String,
}

async fn screenshot(State(state): State<Arc<AppState>>, Json(request): Json<ScreenshotRequest>) -> impl IntoResponse {
    match state.tester.capture_screenshot(&request.page_url, request.browser).await {
        Ok(path) => (StatusCode::OK, Json(ScreenshotResponse { path })).into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}
