use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use testctl_core::alerts::{AlertCandidate, AlertEngine};
use testctl_core::contracts::{AlertPriority, AlertType, Channel};
use testctl_core::health::HealthStatus;

pub struct AppState {
    pub engine: Arc<AlertEngine>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/alert", post(submit_alert))
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id/acknowledge", post(acknowledge))
        .route("/alerts/:id/resolve", post(resolve))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthStatus::new(testctl_core::alerts::SERVICE_NAME).with_metric("queued_notifications", state.engine.queue_len() as f64))
}

#[derive(Debug, Deserialize)]
pub struct SubmitAlertRequest {
    pub alert_type: AlertType,
    #[serde(default = "default_priority")]
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, Value>,
    #[serde(default)]
    pub current_values: HashMap<String, f64>,
    #[serde(default)]
    pub threshold_values: HashMap<String, f64>,
    #[serde(default)]
    pub test_result_id: Option<Uuid>,
    #[serde(default)]
    pub scenario_id: Option<Uuid>,
    pub recipients: Vec<String>,
    pub channels: Vec<Channel>,
}

fn default_priority() -> AlertPriority {
    AlertPriority::Medium
}

/// `POST /alert` (§6): a custom, operator-submitted alert. It bypasses
/// rule matching and rate limiting entirely — unlike rule-derived
/// alerts, a direct submission is never dropped by cooldown or hourly
/// caps.
async fn submit_alert(State(state): State<Arc<AppState>>, Json(request): Json<SubmitAlertRequest>) -> impl IntoResponse {
    if request.recipients.is_empty() || request.channels.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "recipients and channels must both be non-empty"})),
        )
            .into_response();
    }
    let candidate = AlertCandidate {
        alert_type: request.alert_type,
        priority: request.priority,
        title: request.title,
        message: request.message,
        details: request.details,
        current_values: request.current_values,
        threshold_values: request.threshold_values,
        test_result_id: request.test_result_id,
        scenario_id: request.scenario_id,
    };
    let alert_id = state.engine.submit_custom_alert(candidate, &request.recipients, &request.channels);
    (StatusCode::OK, Json(json!({"alert_id": alert_id}))).into_response()
}

async fn list_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.list_open())
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    #[serde(default = "default_acknowledger")]
    pub acknowledged_by: String,
}

fn default_acknowledger() -> String {
    "operator".to_string()
}

async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AcknowledgeRequest>,
) -> impl IntoResponse {
    match state.engine.acknowledge(id, request.acknowledged_by) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}

async fn resolve(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.engine.resolve(id) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}
