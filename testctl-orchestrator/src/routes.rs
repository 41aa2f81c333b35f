use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use testctl_core::contracts::{Environment, TestScenario};
use testctl_core::health::HealthStatus;
use testctl_core::orchestrator::Orchestrator;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(start_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/cancel", post(cancel_session))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthStatus::new(testctl_core::orchestrator::SERVICE_NAME))
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub scenarios: Vec<TestScenario>,
    #[serde(default = "default_environment")]
    pub environment: Environment,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn default_environment() -> Environment {
    Environment::Test
}

#[derive(Debug, Serialize)]
struct StartSessionResponse {
    session_id: Uuid,
    plan_summary: String,
}

/// `POST /sessions` (§6): validates every scenario, builds the phased
/// plan, registers the session and returns immediately — the caller
/// polls `GET /sessions/{id}` for progress.
async fn start_session(State(state): State<Arc<AppState>>, Json(request): Json<StartSessionRequest>) -> impl IntoResponse {
    match state
        .orchestrator
        .start_session(request.scenarios, request.environment, request.metadata)
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(StartSessionResponse { session_id: outcome.session_id, plan_summary: outcome.plan_summary }),
        )
            .into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}

async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.get_session(id) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => (StatusCode::NOT_FOUND, Json(json!({"error": error.to_string()}))).into_response(),
    }
}

async fn cancel_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.orchestrator.cancel_session(id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => (StatusCode::NOT_FOUND, Json(json!({"error": error.to_string()}))).into_response(),
    }
}
