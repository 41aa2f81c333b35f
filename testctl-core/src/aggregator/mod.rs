//! Time-series assembly, trend analysis, quality insights, anomaly
//! detection, and report export over a bounded in-memory window of
//! `TestResult`s (C6).

mod anomaly;
mod export;
mod insights;
mod trends;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::config::ResultsAggregationSection;
use crate::contracts::{
    AggregatedReportRequest, AggregatedResults, AlertPriority, FailureEntry, PerformerEntry,
    QualityInsight, QualityInsightType, QualityMetric, TestResult, TestSummary, TestType,
};
use crate::event_bus::EventBus;

pub use export::{export, ExportError, ExportFormat};

pub const SERVICE_NAME: &str = "aggregator";

const TOP_N: usize = 5;
/// Baseline used for `data_completeness` in the absence of a configured
/// expected-throughput figure (§4.4). Chosen as a conservative steady-state
/// rate; tune via [`ResultsAggregationSection`] in a future revision.
const EXPECTED_TESTS_PER_HOUR: f64 = 10.0;
const MIN_DURATION_SECONDS: f64 = 0.1;

/// Bounded sliding window of `TestResult`s plus the derived reports built
/// from it. Single writer per ingestion path (direct call or the event bus
/// listener); readers take a consistent snapshot under the same lock.
pub struct Aggregator {
    config: ResultsAggregationSection,
    results: Mutex<VecDeque<TestResult>>,
}

impl Aggregator {
    pub fn new(config: ResultsAggregationSection) -> Self {
        Self {
            config,
            results: Mutex::new(VecDeque::new()),
        }
    }

    /// Accepts a result from the direct push path (an executor calling the
    /// aggregator synchronously) or from the event bus listener.
    pub fn ingest(&self, result: TestResult) {
        let mut results = self.results.lock().expect("aggregator window poisoned");
        results.push_back(result);
        evict(&mut results, &self.config);
    }

    /// Drops entries older than `max_window_days` or beyond
    /// `max_stored_results`, whichever is more restrictive (§0 ownership note).
    pub fn cleanup(&self) {
        let mut results = self.results.lock().expect("aggregator window poisoned");
        evict(&mut results, &self.config);
    }

    pub fn stored_count(&self) -> usize {
        self.results.lock().expect("aggregator window poisoned").len()
    }

    /// Subscribes to `result.completed` on `event_bus` and ingests every
    /// payload that decodes as a `TestResult`. Malformed or lagged payloads
    /// are logged and skipped — the aggregator is a pull-fallback mirror of
    /// the authoritative per-execution result, never load-bearing for
    /// correctness (§0).
    pub fn spawn_event_bus_listener(self: &Arc<Self>, event_bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut receiver = event_bus.subscribe("result.completed");
        let aggregator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(value) => match serde_json::from_value::<TestResult>(value) {
                        Ok(result) => aggregator.ingest(result),
                        Err(error) => warn!(%error, "aggregator could not decode result.completed payload"),
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "aggregator event bus listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Assembles an `AggregatedResults` over `[request.start_time,
    /// request.end_time]` (§4.4). Never errors: an empty window yields
    /// `TestSummary::default()` everywhere (§8 round-trip property).
    pub fn generate_aggregated_report(&self, request: &AggregatedReportRequest) -> AggregatedResults {
        let results = self.results.lock().expect("aggregator window poisoned");
        let windowed: Vec<&TestResult> = results
            .iter()
            .filter(|result| result.completed_at >= request.start_time && result.completed_at <= request.end_time)
            .collect();

        let overall = summarize(windowed.iter().copied());

        let mut by_test_type: HashMap<TestType, Vec<&TestResult>> = HashMap::new();
        let mut by_service: HashMap<String, Vec<&TestResult>> = HashMap::new();
        for result in &windowed {
            if let Some(test_type) = infer_test_type(result) {
                by_test_type.entry(test_type).or_default().push(result);
            }
            by_service.entry(result.service.clone()).or_default().push(result);
        }
        let by_test_type = by_test_type
            .into_iter()
            .map(|(test_type, group)| (test_type, summarize(group.into_iter())))
            .collect();
        let by_service = by_service
            .into_iter()
            .map(|(service, group)| (service, summarize(group.into_iter())))
            .collect();

        let trends = if request.include_trends {
            compute_trends(&results, self.config.min_data_points_for_trend)
        } else {
            Vec::new()
        };

        let quality_insights = compute_quality_insights(&results, request);

        let performance_summary = performance_summary(&windowed);
        let top_failures = top_failures(&windowed);
        let top_performers = top_performers(&windowed);
        let recommendations = recommendations(&windowed, &quality_insights);

        let window_hours =
            (request.end_time - request.start_time).num_seconds().max(0) as f64 / 3600.0;
        let expected = (EXPECTED_TESTS_PER_HOUR * window_hours).max(1.0);
        let data_completeness = (windowed.len() as f64 / expected).min(1.0);

        AggregatedResults {
            report_id: Uuid::new_v4(),
            window_start: request.start_time,
            window_end: request.end_time,
            overall,
            by_test_type,
            by_service,
            trends,
            quality_insights,
            performance_summary,
            top_failures,
            top_performers,
            recommendations,
            data_completeness,
            generated_at: Utc::now(),
        }
    }
}

fn evict(results: &mut VecDeque<TestResult>, config: &ResultsAggregationSection) {
    while results.len() > config.max_stored_results {
        results.pop_front();
    }
    let cutoff = Utc::now() - Duration::days(config.max_window_days);
    while results.front().map(|result| result.completed_at < cutoff).unwrap_or(false) {
        results.pop_front();
    }
}

/// `TestResult` carries no explicit `TestType` tag; it is derived from
/// which sub-result is populated, mirroring how the orchestrator fills
/// exactly one of `api_results`/`ui_results`/`ai_quality_results` per
/// phase (§3 TestResult contract).
fn infer_test_type(result: &TestResult) -> Option<TestType> {
    if result.api_results.is_some() {
        Some(TestType::Api)
    } else if result.ui_results.is_some() {
        Some(TestType::Ui)
    } else if result.ai_quality_results.is_some() {
        Some(TestType::AiQuality)
    } else {
        None
    }
}

fn summarize<'a>(results: impl Iterator<Item = &'a TestResult>) -> TestSummary {
    let mut total = 0usize;
    let mut passed = 0usize;
    let mut score_sum = 0.0;
    let mut duration_sum = 0.0;

    for result in results {
        total += 1;
        if result.passed {
            passed += 1;
        }
        score_sum += result.score;
        duration_sum += result.duration_ms as f64;
    }

    if total == 0 {
        return TestSummary::default();
    }

    TestSummary {
        total,
        passed,
        failed: total - passed,
        avg_score: score_sum / total as f64,
        avg_duration_ms: duration_sum / total as f64,
        success_rate: passed as f64 / total as f64,
    }
}

fn performance_summary(windowed: &[&TestResult]) -> HashMap<String, f64> {
    let mut summary = HashMap::new();
    if windowed.is_empty() {
        return summary;
    }
    let durations: Vec<f64> = windowed.iter().map(|result| result.duration_ms as f64).collect();
    summary.insert("avg_duration_ms".to_string(), durations.iter().sum::<f64>() / durations.len() as f64);
    summary.insert("p95_duration_ms".to_string(), crate::api_tester::percentile(&durations, 95.0));
    summary.insert(
        "avg_score".to_string(),
        windowed.iter().map(|result| result.score).sum::<f64>() / windowed.len() as f64,
    );
    summary
}

fn top_failures(windowed: &[&TestResult]) -> Vec<FailureEntry> {
    let mut counts: HashMap<Uuid, usize> = HashMap::new();
    for result in windowed {
        if !result.passed {
            *counts.entry(result.scenario_id).or_insert(0) += 1;
        }
    }
    let mut entries: Vec<FailureEntry> = counts
        .into_iter()
        .map(|(scenario_id, failure_count)| FailureEntry { scenario_id, failure_count })
        .collect();
    entries.sort_by(|a, b| b.failure_count.cmp(&a.failure_count));
    entries.truncate(TOP_N);
    entries
}

fn top_performers(windowed: &[&TestResult]) -> Vec<PerformerEntry> {
    let mut groups: HashMap<Uuid, Vec<&TestResult>> = HashMap::new();
    for result in windowed {
        groups.entry(result.scenario_id).or_default().push(result);
    }
    let mut entries: Vec<PerformerEntry> = groups
        .into_iter()
        .map(|(scenario_id, group)| {
            let avg_score = group.iter().map(|r| r.score).sum::<f64>() / group.len() as f64;
            let avg_duration_s =
                group.iter().map(|r| r.duration_ms as f64).sum::<f64>() / group.len() as f64 / 1000.0;
            let ratio = avg_score / avg_duration_s.max(MIN_DURATION_SECONDS);
            PerformerEntry { scenario_id, avg_score, avg_duration_s, ratio }
        })
        .collect();
    entries.sort_by(|a, b| b.ratio.partial_cmp(&a.ratio).unwrap_or(std::cmp::Ordering::Equal));
    entries.truncate(TOP_N);
    entries
}

fn recommendations(windowed: &[&TestResult], quality_insights: &[QualityInsight]) -> Vec<String> {
    let mut seen = Vec::new();
    for result in windowed {
        for recommendation in &result.recommendations {
            if !seen.contains(recommendation) {
                seen.push(recommendation.clone());
            }
        }
    }
    for insight in quality_insights {
        for recommendation in &insight.recommendations {
            if !seen.contains(recommendation) {
                seen.push(recommendation.clone());
            }
        }
    }
    seen
}

/// Per-metric quality-score series plus the overall score and duration
/// series, each as `(timestamp, value)` pairs ordered by completion time.
fn metric_series(results: &VecDeque<TestResult>) -> HashMap<QualityMetric, Vec<(DateTime<Utc>, f64)>> {
    let mut series: HashMap<QualityMetric, Vec<(DateTime<Utc>, f64)>> = HashMap::new();
    let mut ordered: Vec<&TestResult> = results.iter().collect();
    ordered.sort_by_key(|result| result.completed_at);
    for result in ordered {
        for (metric, score) in &result.quality_scores {
            series.entry(*metric).or_default().push((result.completed_at, *score));
        }
    }
    series
}

fn compute_trends(
    results: &VecDeque<TestResult>,
    min_samples: usize,
) -> Vec<crate::contracts::TrendAnalysis> {
    let mut trends = Vec::new();

    for (metric, series) in metric_series(results) {
        if let Some(trend) = trends::compute_trend(&format!("{:?}", metric), &series, true, min_samples) {
            trends.push(trend);
        }
    }

    let mut ordered: Vec<&TestResult> = results.iter().collect();
    ordered.sort_by_key(|result| result.completed_at);
    let duration_series: Vec<(DateTime<Utc>, f64)> =
        ordered.iter().map(|result| (result.completed_at, result.duration_ms as f64)).collect();
    if let Some(trend) = trends::compute_trend("duration_ms", &duration_series, false, min_samples) {
        trends.push(trend);
    }
    let score_series: Vec<(DateTime<Utc>, f64)> =
        ordered.iter().map(|result| (result.completed_at, result.score)).collect();
    if let Some(trend) = trends::compute_trend("score", &score_series, true, min_samples) {
        trends.push(trend);
    }

    trends
}

/// Runs the recent-change, pattern, and comparative detectors per
/// quality metric, plus anomaly detection over the duration series,
/// producing `QualityInsight`s (§4.4). Looks at the full stored window
/// rather than just the requested report window: insights describe
/// shifts over time, which a narrow report window would starve.
fn compute_quality_insights(
    results: &VecDeque<TestResult>,
    _request: &AggregatedReportRequest,
) -> Vec<QualityInsight> {
    let mut insights = Vec::new();
    let series = metric_series(results);

    for (metric, points) in &series {
        let values: Vec<f64> = points.iter().map(|(_, value)| *value).collect();
        if let Some(insight) = insights::recent_change(*metric, &values) {
            insights.push(insight);
        }
        if let Some(insight) = insights::pattern(*metric, &values) {
            insights.push(insight);
        }
        if values.len() >= 4 {
            let half = values.len() / 2;
            let (historical, current) = values.split_at(half);
            if let Some(insight) = insights::comparative(*metric, current, historical) {
                insights.push(insight);
            }
        }
    }

    let mut ordered: Vec<&TestResult> = results.iter().collect();
    ordered.sort_by_key(|result| result.completed_at);
    let durations: Vec<f64> = ordered.iter().map(|result| result.duration_ms as f64).collect();
    let duration_anomalies = anomaly::detect_anomalies(&durations);
    if !duration_anomalies.is_empty() {
        insights.push(QualityInsight {
            insight_type: QualityInsightType::Pattern,
            confidence: (duration_anomalies.len() as f64 / durations.len().max(1) as f64).min(1.0),
            title: "Anomalous response durations detected".to_string(),
            description: format!(
                "{} of {} stored results fall more than two standard deviations from the mean duration.",
                duration_anomalies.len(),
                durations.len()
            ),
            affected_metrics: Vec::new(),
            evidence: duration_anomalies
                .iter()
                .map(|anomaly| format!("index {} value {:.1}ms (mean {:.1}ms)", anomaly.index, anomaly.value, anomaly.mean))
                .collect(),
            recommendations: vec!["Investigate recent latency outliers".to_string()],
            priority: AlertPriority::Medium,
        });
    }

    insights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ApiSubResult;

    fn api_result(scenario_id: Uuid, passed: bool, score: f64, duration_ms: u64, service: &str) -> TestResult {
        TestResult {
            execution_id: Uuid::new_v4(),
            scenario_id,
            service: service.to_string(),
            passed,
            score,
            duration_ms,
            api_results: Some(ApiSubResult::default()),
            ui_results: None,
            ai_quality_results: None,
            quality_scores: HashMap::new(),
            performance_metrics: HashMap::new(),
            evidence_paths: Vec::new(),
            error_type: None,
            error_message: None,
            recommendations: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn empty_window_yields_default_summary_not_an_error() {
        let aggregator = Aggregator::new(ResultsAggregationSection::default());
        let report = aggregator.generate_aggregated_report(&AggregatedReportRequest {
            start_time: Utc::now() - Duration::hours(1),
            end_time: Utc::now(),
            include_trends: false,
        });
        assert_eq!(report.overall, TestSummary::default());
        assert_eq!(report.data_completeness, 0.0);
    }

    #[test]
    fn ingested_results_roll_up_into_overall_summary() {
        let aggregator = Aggregator::new(ResultsAggregationSection::default());
        let scenario_id = Uuid::new_v4();
        aggregator.ingest(api_result(scenario_id, true, 0.9, 100, "api_tester"));
        aggregator.ingest(api_result(scenario_id, false, 0.2, 200, "api_tester"));

        let report = aggregator.generate_aggregated_report(&AggregatedReportRequest {
            start_time: Utc::now() - Duration::hours(1),
            end_time: Utc::now() + Duration::hours(1),
            include_trends: false,
        });
        assert_eq!(report.overall.total, 2);
        assert_eq!(report.overall.passed, 1);
        assert_eq!(report.overall.failed, 1);
        assert!(report.by_test_type.contains_key(&TestType::Api));
        assert!(report.by_service.contains_key("api_tester"));
        assert_eq!(report.top_failures.len(), 1);
        assert_eq!(report.top_failures[0].failure_count, 1);
    }

    #[test]
    fn eviction_respects_max_stored_results() {
        let mut config = ResultsAggregationSection::default();
        config.max_stored_results = 3;
        let aggregator = Aggregator::new(config);
        for _ in 0..10 {
            aggregator.ingest(api_result(Uuid::new_v4(), true, 0.8, 50, "api_tester"));
        }
        assert_eq!(aggregator.stored_count(), 3);
    }

    #[tokio::test]
    async fn aggregator_ingests_from_event_bus() {
        let bus = EventBus::default();
        let aggregator = Arc::new(Aggregator::new(ResultsAggregationSection::default()));
        let handle = aggregator.spawn_event_bus_listener(&bus);

        let result = api_result(Uuid::new_v4(), true, 0.75, 30, "quality_judge");
        bus.publish("result.completed", &result);

        for _ in 0..50 {
            if aggregator.stored_count() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(aggregator.stored_count(), 1);
        handle.abort();
    }
}
