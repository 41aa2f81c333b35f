//! Cross-module session flow: the orchestrator fanning a mixed API +
//! quality-assessment session out to real executors, folding their
//! results into the aggregator and alert engine, and composing a verdict.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use testctl_core::aggregator::Aggregator;
use testctl_core::alerts::AlertEngine;
use testctl_core::api_tester::ApiTester;
use testctl_core::contracts::{
    AiQualitySpec, ApiTestSpec, Environment, HttpMethod, QualityMetric, QualityScore, TestConfig,
    TestScenario, TestType,
};
use testctl_core::event_bus::EventBus;
use testctl_core::orchestrator::{Orchestrator, SessionState};
use testctl_core::quality_judge::{QualityJudge, StaticJudge};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn wait_for_completion(orchestrator: &Arc<Orchestrator>, session_id: uuid::Uuid) -> testctl_core::orchestrator::SessionView {
    for _ in 0..200 {
        let view = orchestrator.get_session(session_id).unwrap();
        if view.state != SessionState::Running {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session did not complete in time");
}

/// A full session with one passing API probe and one quality
/// assessment runs both phases, ingests both results into the
/// aggregator, and composes a passing verdict above the default
/// threshold.
#[tokio::test]
async fn mixed_session_completes_with_a_passing_composite_verdict() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .mount(&mock_server)
        .await;

    let event_bus = Arc::new(EventBus::default());
    let aggregator = Arc::new(Aggregator::new(Default::default()));
    let alert_engine = Arc::new(AlertEngine::new(Vec::new(), 3));
    let api_tester = Arc::new(ApiTester::new(Duration::from_secs(5), 1));
    let confident = |text: &str| QualityScore {
        score: 0.95,
        confidence: 0.9,
        reasoning: text.to_string(),
        evidence: Vec::new(),
        suggestions: Vec::new(),
    };
    let judge = StaticJudge::new("primary")
        .with_score(QualityMetric::Coherence, confident("coherent"))
        .with_score(QualityMetric::Safety, confident("safe"));
    let judges: Vec<Arc<dyn testctl_core::quality_judge::Judge>> = vec![Arc::new(judge)];
    let quality_judge = Arc::new(QualityJudge::new(judges, 60));

    let orchestrator = Arc::new(Orchestrator::new(
        Some(api_tester),
        None,
        Some(quality_judge),
        Arc::clone(&aggregator),
        Arc::clone(&alert_engine),
        event_bus,
        0.5,
    ));

    let api_scenario = TestScenario::new(
        "health probe",
        TestType::Api,
        TestConfig::Api(ApiTestSpec {
            endpoint: "/health".into(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            query_params: HashMap::new(),
            path_params: HashMap::new(),
            request_body: None,
            expected_status: 200,
            expected_response_schema: None,
            response_time_threshold_ms: 2000,
        }),
    )
    .unwrap();

    let quality_scenario = TestScenario::new(
        "tone check",
        TestType::AiQuality,
        TestConfig::AiQuality(AiQualitySpec {
            input_prompt: "Summarize the onboarding email.".into(),
            context_data: None,
            assessment_models: vec!["primary".into()],
            quality_metrics: vec![QualityMetric::Coherence, QualityMetric::Safety],
            reference_outputs: None,
            baseline_scores: None,
            temperature: 0.7,
            max_tokens: 512,
        }),
    )
    .unwrap();

    let mut metadata = HashMap::new();
    metadata.insert("base_url".to_string(), serde_json::json!(mock_server.uri()));

    let outcome = orchestrator
        .start_session(vec![api_scenario, quality_scenario], Environment::Test, metadata)
        .unwrap();

    let view = wait_for_completion(&orchestrator, outcome.session_id).await;
    assert_eq!(view.state, SessionState::Completed);

    let verdict = view.verdict.expect("completed session has a verdict");
    assert!(verdict.overall_passed, "expected a passing verdict, got {verdict:?}");
    assert!(verdict.overall_score >= 0.5);

    // Both results should have been folded into the aggregator's window.
    let report = aggregator.generate_aggregated_report(&testctl_core::contracts::AggregatedReportRequest {
        start_time: chrono::Utc::now() - chrono::Duration::hours(1),
        end_time: chrono::Utc::now() + chrono::Duration::hours(1),
        include_trends: false,
    });
    assert_eq!(report.overall.total, 2);
}

/// §8 idempotence: an aggregation over an empty window yields a zeroed
/// `TestSummary`, never an error.
#[test]
fn empty_window_report_is_a_zeroed_summary_not_an_error() {
    let aggregator = Aggregator::new(Default::default());
    let report = aggregator.generate_aggregated_report(&testctl_core::contracts::AggregatedReportRequest {
        start_time: chrono::Utc::now() - chrono::Duration::hours(1),
        end_time: chrono::Utc::now(),
        include_trends: true,
    });
    assert_eq!(report.overall.total, 0);
    assert_eq!(report.overall.avg_score, 0.0);
}
