use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use testctl_core::api_tester::{ApiTester, LoadStats};
use testctl_core::contracts::{TestContext, TestScenario};
use testctl_core::health::HealthStatus;

pub struct AppState {
    pub tester: ApiTester,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/test", post(run_test))
        .route("/test/load", post(run_load_test))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthStatus::new(testctl_core::api_tester::SERVICE_NAME))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub scenario: TestScenario,
    #[serde(default = "default_context")]
    pub context: TestContext,
}

fn default_context() -> TestContext {
    TestContext::new(uuid::Uuid::new_v4(), testctl_core::contracts::Environment::Test)
}

/// `POST /test` — a test *failing* is still HTTP 200 (§7: "a test
/// failing is not an API failure"); only a malformed request body or a
/// scenario that isn't an API test is rejected with 422.
async fn run_test(State(state): State<Arc<AppState>>, Json(request): Json<ExecuteRequest>) -> impl IntoResponse {
    if let Err(error) = request.scenario.validate() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response();
    }
    match state.tester.execute_api_test(&request.scenario, &request.context).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadTestRequest {
    pub scenario: TestScenario,
    #[serde(default = "default_context")]
    pub context: TestContext,
    pub concurrent_users: u32,
    pub duration_seconds: u64,
}

#[derive(Debug, Serialize)]
struct LoadTestResponse {
    #[serde(flatten)]
    stats: LoadStats,
}

async fn run_load_test(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoadTestRequest>,
) -> impl IntoResponse {
    if let Err(error) = request.scenario.validate() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response();
    }
    match state
        .tester
        .run_load_test(&request.scenario, &request.context, request.concurrent_users, request.duration_seconds)
        .await
    {
        Ok(stats) => (StatusCode::OK, Json(LoadTestResponse { stats })).into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}

