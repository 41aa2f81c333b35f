use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use testctl_core::contracts::{Environment, QualityAssessmentRequest, QualityMetric, TestContext};
use testctl_core::health::HealthStatus;
use testctl_core::quality_judge::QualityJudge;

pub struct AppState {
    pub judge: QualityJudge,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/assess", post(assess))
        .route("/compare", post(compare))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthStatus::new(testctl_core::quality_judge::SERVICE_NAME))
}

fn default_context() -> TestContext {
    TestContext::new(uuid::Uuid::new_v4(), Environment::Test)
}

#[derive(Debug, Deserialize)]
pub struct AssessRequest {
    #[serde(flatten)]
    pub request: QualityAssessmentRequest,
    #[serde(default = "default_context")]
    pub context: TestContext,
}

async fn assess(State(state): State<Arc<AppState>>, Json(body): Json<AssessRequest>) -> impl IntoResponse {
    match state.judge.assess_quality(&body.request, &body.context).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub scenario_id: uuid::Uuid,
    pub input_prompt: String,
    pub outputs: Vec<String>,
    pub quality_metrics: Vec<QualityMetric>,
    #[serde(default = "default_context")]
    pub context: TestContext,
}

#[derive(Debug, Serialize)]
struct CompareResponse {
    scores: Vec<f64>,
}

async fn compare(State(state): State<Arc<AppState>>, Json(body): Json<CompareRequest>) -> impl IntoResponse {
    match state
        .judge
        .compare(body.scenario_id, &body.input_prompt, &body.outputs, &body.quality_metrics, &body.context)
        .await
    {
        Ok(scores) => (StatusCode::OK, Json(CompareResponse { scores })).into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}
