use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use testctl_core::aggregator::{export, Aggregator, ExportFormat};
use testctl_core::contracts::{AggregatedReportRequest, AggregatedResults};
use testctl_core::health::HealthStatus;

pub struct AppState {
    pub aggregator: Aggregator,
    pub reports: Mutex<HashMap<Uuid, AggregatedResults>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/collect", post(collect))
        .route("/report", post(report))
        .route("/export/:report_id", get(export_report))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthStatus::new(testctl_core::aggregator::SERVICE_NAME).with_metric("stored_results", state.aggregator.stored_count() as f64))
}

#[derive(Debug, Serialize)]
struct CollectResponse {
    stored_count: usize,
}

/// Results already arrive via the in-process event bus as they
/// complete; `/collect` is a manual compaction trigger rather than a
/// network fan-out to executors, and reports the current window size.
async fn collect(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.aggregator.cleanup();
    Json(CollectResponse { stored_count: state.aggregator.stored_count() })
}

async fn report(State(state): State<Arc<AppState>>, Json(request): Json<AggregatedReportRequest>) -> impl IntoResponse {
    let results = state.aggregator.generate_aggregated_report(&request);
    state.reports.lock().expect("report cache poisoned").insert(results.report_id, results.clone());
    Json(results)
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "json".to_string()
}

async fn export_report(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> impl IntoResponse {
    let format: ExportFormat = match query.format.parse() {
        Ok(format) => format,
        Err(error) => return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    };
    let results = {
        let reports = state.reports.lock().expect("report cache poisoned");
        match reports.get(&report_id) {
            Some(results) => results.clone(),
            None => return (StatusCode::NOT_FOUND, Json(json!({"error": format!("no report {report_id}")}))).into_response(),
        }
    };
    match export(&results, format) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(error) => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": error.to_string()}))).into_response(),
    }
}
