use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::alert::AlertPriority;
use super::quality::QualityMetric;
use super::scenario::TestType;

/// Summary over a window of `TestResult`s. An empty window yields
/// `TestSummary::default()` — never an error (§8 round-trip property).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub avg_score: f64,
    pub avg_duration_ms: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    Volatile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metric: String,
    pub direction: TrendDirection,
    pub slope: f64,
    pub correlation: f64,
    pub confidence: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityInsightType {
    RecentRegression,
    RecentImprovement,
    Pattern,
    Comparative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityInsight {
    pub insight_type: QualityInsightType,
    pub confidence: f64,
    pub title: String,
    pub description: String,
    pub affected_metrics: Vec<QualityMetric>,
    pub evidence: Vec<String>,
    pub recommendations: Vec<String>,
    pub priority: AlertPriority,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Anomaly {
    pub index: usize,
    pub value: f64,
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEntry {
    pub scenario_id: Uuid,
    pub failure_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformerEntry {
    pub scenario_id: Uuid,
    pub avg_score: f64,
    pub avg_duration_s: f64,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedReportRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub include_trends: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResults {
    pub report_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub overall: TestSummary,
    pub by_test_type: HashMap<TestType, TestSummary>,
    pub by_service: HashMap<String, TestSummary>,
    pub trends: Vec<TrendAnalysis>,
    pub quality_insights: Vec<QualityInsight>,
    pub performance_summary: HashMap<String, f64>,
    pub top_failures: Vec<FailureEntry>,
    pub top_performers: Vec<PerformerEntry>,
    pub recommendations: Vec<String>,
    pub data_completeness: f64,
    pub generated_at: DateTime<Utc>,
}
