//! Session lifecycle, phased plan building, fan-out to the four
//! executors, and composite verdict assembly (C8).

mod plan;
mod session;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub use plan::{PhaseName, SessionPlan};
pub use session::{PhaseState, PhaseStatus, SessionState, SessionView, Verdict};
use session::SessionHandle;

use crate::aggregator::Aggregator;
use crate::alerts::AlertEngine;
use crate::api_tester::ApiTester;
use crate::browser_tester::BrowserTester;
use crate::contracts::{
    AggregatedReportRequest, ErrorKind, Environment, ExecutionState, TestContext, TestExecution,
    TestResult, TestScenario,
};
use crate::event_bus::EventBus;
use crate::quality_judge::QualityJudge;

pub const SERVICE_NAME: &str = "orchestrator";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("scenario {0} is invalid: {1}")]
    InvalidScenario(Uuid, String),
    #[error("phase {phase} requires {service}, which is not configured")]
    MissingExecutor { phase: &'static str, service: &'static str },
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// The response to `POST /sessions` (§6): the assigned id plus a
/// human-readable summary of the plan that was built for it.
pub struct StartSessionOutcome {
    pub session_id: Uuid,
    pub plan_summary: String,
}

/// Wires together the four executors, the aggregator and the alert
/// engine behind one session-scoped coordinating loop. An executor that
/// is `None` means that phase is configured out (§7 Configuration error:
/// "the orchestrator refuses to schedule phases that require it") rather
/// than a panic.
pub struct Orchestrator {
    api_tester: Option<Arc<ApiTester>>,
    browser_tester: Option<Arc<BrowserTester>>,
    quality_judge: Option<Arc<QualityJudge>>,
    aggregator: Arc<Aggregator>,
    alert_engine: Arc<AlertEngine>,
    event_bus: Arc<EventBus>,
    quality_threshold: f64,
    /// Auth headers injected into every session's `TestContext` ahead
    /// of each scenario's own `spec.headers` (§4.1).
    auth_headers: HashMap<String, String>,
    sessions: Mutex<HashMap<Uuid, SessionHandle>>,
}

impl Orchestrator {
    pub fn new(
        api_tester: Option<Arc<ApiTester>>,
        browser_tester: Option<Arc<BrowserTester>>,
        quality_judge: Option<Arc<QualityJudge>>,
        aggregator: Arc<Aggregator>,
        alert_engine: Arc<AlertEngine>,
        event_bus: Arc<EventBus>,
        quality_threshold: f64,
    ) -> Self {
        Self {
            api_tester,
            browser_tester,
            quality_judge,
            aggregator,
            alert_engine,
            event_bus,
            quality_threshold,
            auth_headers: HashMap::new(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the auth headers to inject into every session built by this
    /// orchestrator (§4.1's "auth-injected" side of the header merge).
    pub fn with_auth_headers(mut self, auth_headers: HashMap<String, String>) -> Self {
        self.auth_headers = auth_headers;
        self
    }

    /// Validates every scenario, builds the phased plan, registers the
    /// session and spawns the coordinating task. Returns as soon as the
    /// session is registered — the caller polls `get_session` for
    /// progress (§6 `POST /sessions`).
    pub fn start_session(
        self: &Arc<Self>,
        scenarios: Vec<TestScenario>,
        environment: Environment,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<StartSessionOutcome> {
        for scenario in &scenarios {
            scenario
                .validate()
                .map_err(|err| OrchestratorError::InvalidScenario(scenario.id, err.to_string()))?;
        }

        let session_id = Uuid::new_v4();
        let plan = SessionPlan::build(scenarios);
        let plan_summary = plan.summary();

        let mut phases = Vec::new();
        for phase in plan.phases_with_work() {
            let count = match phase {
                PhaseName::ApiProbes => plan.api_probes.len(),
                PhaseName::UiFlows => plan.ui_flows.len(),
                PhaseName::QualityAssessments => plan.quality_assessments.len(),
                PhaseName::Aggregation => 0,
            };
            phases.push(PhaseStatus::pending(phase, count));
        }
        phases.push(PhaseStatus::pending(PhaseName::Aggregation, 0));

        let mut context = TestContext::new(session_id, environment);
        context.metadata = metadata;
        context.auth_headers = self.auth_headers.clone();

        let handle = SessionHandle::new(session_id, phases);
        let cancelled = Arc::clone(&handle.cancelled);
        self.sessions.lock().unwrap().insert(session_id, handle);

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_session(session_id, plan, context, cancelled).await;
        });

        Ok(StartSessionOutcome { session_id, plan_summary })
    }

    pub fn get_session(&self, session_id: Uuid) -> Result<SessionView> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(&session_id)
            .map(SessionHandle::view)
            .ok_or(OrchestratorError::SessionNotFound(session_id))
    }

    /// Transitions every non-terminal execution of `session_id` to
    /// CANCELLED, flips the session's cancellation flag (observed at the
    /// coordinating task's next suspension point), and emits
    /// `session.cancelled`. Already-completed results are preserved.
    pub fn cancel_session(&self, session_id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let handle = sessions
            .get_mut(&session_id)
            .ok_or(OrchestratorError::SessionNotFound(session_id))?;
        handle.request_cancellation();
        for execution in handle.executions.values_mut() {
            if !execution.state.is_terminal() {
                let _ = execution.transition(ExecutionState::Cancelled);
            }
        }
        self.event_bus.publish(
            "session.cancelled",
            &json!({"session_id": session_id, "at": Utc::now()}),
        );
        Ok(())
    }

    async fn run_session(
        self: Arc<Self>,
        session_id: Uuid,
        plan: SessionPlan,
        context: TestContext,
        cancelled: Arc<std::sync::atomic::AtomicBool>,
    ) {
        self.event_bus.publish(
            "session.started",
            &json!({"session_id": session_id, "at": Utc::now()}),
        );
        info!(%session_id, "session started");

        let mut phase_outcomes: Vec<(PhaseName, bool, f64)> = Vec::new();

        for (phase, scenarios) in [
            (PhaseName::ApiProbes, plan.api_probes),
            (PhaseName::UiFlows, plan.ui_flows),
            (PhaseName::QualityAssessments, plan.quality_assessments),
        ] {
            if scenarios.is_empty() {
                continue;
            }
            if cancelled.load(std::sync::atomic::Ordering::SeqCst) {
                break;
            }
            self.event_bus.publish(
                "phase.started",
                &json!({"session_id": session_id, "phase": phase.as_str(), "at": Utc::now()}),
            );
            self.set_phase_running(session_id, phase);

            let results = self.run_phase(phase, &scenarios, &context, session_id, &cancelled).await;
            let (passed, score) = summarize_phase(&results);

            for result in &results {
                self.aggregator.ingest(result.clone());
                self.alert_engine.evaluate_test_result(result, Utc::now());
                self.event_bus.publish("result.completed", result);
            }
            self.record_phase_completion(session_id, phase, passed, score, results);

            self.event_bus.publish(
                "phase.completed",
                &json!({
                    "session_id": session_id,
                    "phase": phase.as_str(),
                    "passed": passed,
                    "score": score,
                    "at": Utc::now(),
                }),
            );
            phase_outcomes.push((phase, passed, score));
        }

        self.event_bus.publish(
            "phase.started",
            &json!({"session_id": session_id, "phase": "aggregation", "at": Utc::now()}),
        );
        self.set_phase_running(session_id, PhaseName::Aggregation);
        let report = self.aggregator.generate_aggregated_report(&AggregatedReportRequest {
            start_time: context_start(session_id, &self.sessions).unwrap_or_else(Utc::now),
            end_time: Utc::now(),
            include_trends: true,
        });
        self.alert_engine.evaluate_aggregated_results(&report, Utc::now());
        self.event_bus.publish(
            "phase.completed",
            &json!({"session_id": session_id, "phase": "aggregation", "passed": true, "score": 1.0, "at": Utc::now()}),
        );

        let was_cancelled = cancelled.load(std::sync::atomic::Ordering::SeqCst);
        let verdict = composite_verdict(&phase_outcomes, self.quality_threshold);

        {
            let mut sessions = self.sessions.lock().unwrap();
            if let Some(handle) = sessions.get_mut(&session_id) {
                handle.phase_mut(PhaseName::Aggregation).state = PhaseState::Completed;
                handle.phase_mut(PhaseName::Aggregation).passed = Some(true);
                handle.phase_mut(PhaseName::Aggregation).score = Some(1.0);
                handle.aggregated_report = Some(report);
                handle.verdict = Some(verdict.clone());
                handle.state = if was_cancelled {
                    SessionState::Cancelled
                } else {
                    SessionState::Completed
                };
            }
        }

        self.event_bus.publish(
            "session.completed",
            &json!({"session_id": session_id, "verdict": verdict, "at": Utc::now()}),
        );
        info!(%session_id, overall_passed = verdict.overall_passed, overall_score = verdict.overall_score, "session completed");
    }

    async fn run_phase(
        &self,
        phase: PhaseName,
        scenarios: &[TestScenario],
        context: &TestContext,
        session_id: Uuid,
        cancelled: &Arc<std::sync::atomic::AtomicBool>,
    ) -> Vec<TestResult> {
        let mut futures = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let execution = TestExecution::new(scenario.id, session_id);
            self.track_execution(session_id, execution.clone());
            futures.push(self.run_one(phase, scenario.clone(), context.clone(), session_id, execution, Arc::clone(cancelled)));
        }
        futures::future::join_all(futures).await
    }

    async fn run_one(
        &self,
        phase: PhaseName,
        scenario: TestScenario,
        context: TestContext,
        session_id: Uuid,
        mut execution: TestExecution,
        cancelled: Arc<std::sync::atomic::AtomicBool>,
    ) -> TestResult {
        if cancelled.load(std::sync::atomic::Ordering::SeqCst) {
            let _ = execution.transition(ExecutionState::Cancelled);
            self.track_execution(session_id, execution);
            return TestResult::failure(
                Uuid::new_v4(),
                scenario.id,
                SERVICE_NAME,
                0,
                ErrorKind::Internal,
                "session was cancelled before this scenario started",
            );
        }

        let _ = execution.transition(ExecutionState::Running);
        self.track_execution(session_id, execution.clone());

        let result = match phase {
            PhaseName::ApiProbes => match &self.api_tester {
                Some(tester) => tester.execute_api_test(&scenario, &context).await.unwrap_or_else(|err| {
                    TestResult::failure(Uuid::new_v4(), scenario.id, SERVICE_NAME, 0, ErrorKind::Internal, err.to_string())
                }),
                None => configuration_failure(scenario.id, "api_tester"),
            },
            PhaseName::UiFlows => match &self.browser_tester {
                Some(tester) => tester.execute_ui_test(&scenario, &context).await.unwrap_or_else(|err| {
                    TestResult::failure(Uuid::new_v4(), scenario.id, SERVICE_NAME, 0, ErrorKind::Internal, err.to_string())
                }),
                None => configuration_failure(scenario.id, "browser_tester"),
            },
            PhaseName::QualityAssessments => match &self.quality_judge {
                Some(judge) => judge.execute_ai_quality_test(&scenario, &context).await.unwrap_or_else(|err| {
                    TestResult::failure(Uuid::new_v4(), scenario.id, SERVICE_NAME, 0, ErrorKind::Internal, err.to_string())
                }),
                None => configuration_failure(scenario.id, "quality_judge"),
            },
            PhaseName::Aggregation => unreachable!("aggregation phase has no scenarios of its own"),
        };

        let next_state = if result.passed {
            ExecutionState::Completed
        } else if result.error_type == Some(ErrorKind::Timeout) {
            ExecutionState::Timeout
        } else {
            ExecutionState::Failed
        };
        let _ = execution.transition(next_state);
        self.track_execution(session_id, execution);
        result
    }

    fn track_execution(&self, session_id: Uuid, execution: TestExecution) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(handle) = sessions.get_mut(&session_id) {
            handle.executions.insert(execution.id, execution);
        }
    }

    fn set_phase_running(&self, session_id: Uuid, phase: PhaseName) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(handle) = sessions.get_mut(&session_id) {
            handle.phase_mut(phase).state = PhaseState::Running;
        }
    }

    fn record_phase_completion(
        &self,
        session_id: Uuid,
        phase: PhaseName,
        passed: bool,
        score: f64,
        results: Vec<TestResult>,
    ) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(handle) = sessions.get_mut(&session_id) {
            let status = handle.phase_mut(phase);
            status.state = PhaseState::Completed;
            status.passed = Some(passed);
            status.score = Some(score);
            handle.results.extend(results);
        } else {
            warn!(%session_id, ?phase, "session vanished before phase completion was recorded");
        }
    }
}

fn configuration_failure(scenario_id: Uuid, service: &'static str) -> TestResult {
    TestResult::failure(
        Uuid::new_v4(),
        scenario_id,
        service,
        0,
        ErrorKind::Configuration,
        format!("{service} is not configured for this orchestrator instance"),
    )
}

fn summarize_phase(results: &[TestResult]) -> (bool, f64) {
    if results.is_empty() {
        return (true, 1.0);
    }
    let passed = results.iter().all(|r| r.passed);
    let score = results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64;
    (passed, score)
}

/// `overall_score = mean(phase_scores)`; `overall_passed` requires every
/// phase's own `passed` AND the averaged score to clear the threshold
/// (§4.6). A session with no scenarios in any phase is vacuously passed.
fn composite_verdict(phase_outcomes: &[(PhaseName, bool, f64)], quality_threshold: f64) -> Verdict {
    if phase_outcomes.is_empty() {
        return Verdict {
            overall_passed: true,
            overall_score: 1.0,
            quality_threshold,
        };
    }
    let overall_score =
        phase_outcomes.iter().map(|(_, _, score)| score).sum::<f64>() / phase_outcomes.len() as f64;
    let all_phases_passed = phase_outcomes.iter().all(|(_, passed, _)| *passed);
    Verdict {
        overall_passed: all_phases_passed && overall_score >= quality_threshold,
        overall_score,
        quality_threshold,
    }
}

fn context_start(
    session_id: Uuid,
    sessions: &Mutex<HashMap<Uuid, SessionHandle>>,
) -> Option<chrono::DateTime<Utc>> {
    sessions.lock().unwrap().get(&session_id).map(|handle| handle.started_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ApiTestSpec, HttpMethod, TestConfig, TestType};
    use crate::quality_judge::StaticJudge;
    use std::collections::HashMap as Map;
    use std::time::Duration;

    fn orchestrator() -> Arc<Orchestrator> {
        let event_bus = Arc::new(EventBus::default());
        let aggregator = Arc::new(Aggregator::new(Default::default()));
        let alert_engine = Arc::new(AlertEngine::new(Vec::new(), 3));
        let api_tester = Arc::new(ApiTester::new(Duration::from_secs(5), 1));
        let judges: Vec<Arc<dyn crate::quality_judge::Judge>> = vec![Arc::new(StaticJudge::new("primary"))];
        let quality_judge = Arc::new(QualityJudge::new(judges, 60));
        Arc::new(Orchestrator::new(
            Some(api_tester),
            None,
            Some(quality_judge),
            aggregator,
            alert_engine,
            event_bus,
            0.8,
        ))
    }

    fn api_scenario(endpoint: &str) -> TestScenario {
        TestScenario::new(
            "probe",
            TestType::Api,
            TestConfig::Api(ApiTestSpec {
                endpoint: endpoint.into(),
                method: HttpMethod::Get,
                headers: Map::new(),
                query_params: Map::new(),
                path_params: Map::new(),
                request_body: None,
                expected_status: 200,
                expected_response_schema: None,
                response_time_threshold_ms: 1000,
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn a_session_with_no_scenarios_completes_with_a_vacuous_pass() {
        let orchestrator = orchestrator();
        let outcome = orchestrator
            .start_session(Vec::new(), Environment::Test, Map::new())
            .unwrap();
        let view = wait_for_completion(&orchestrator, outcome.session_id).await;
        assert_eq!(view.state, SessionState::Completed);
        assert!(view.verdict.unwrap().overall_passed);
    }

    #[tokio::test]
    async fn unreachable_endpoint_without_base_url_surfaces_as_a_failed_phase() {
        let orchestrator = orchestrator();
        let outcome = orchestrator
            .start_session(vec![api_scenario("/health")], Environment::Test, Map::new())
            .unwrap();
        let view = wait_for_completion(&orchestrator, outcome.session_id).await;
        let verdict = view.verdict.unwrap();
        assert!(!verdict.overall_passed);
        assert!(verdict.overall_score < 0.8);
    }

    #[tokio::test]
    async fn missing_browser_tester_is_a_configuration_failure_not_a_panic() {
        let orchestrator = orchestrator();
        let ui_scenario = TestScenario::new(
            "ui probe",
            TestType::Ui,
            TestConfig::Ui(crate::contracts::UiTestSpec {
                page_url: "https://example.test".into(),
                viewport_size: crate::contracts::ViewportSize { width: 1280, height: 800 },
                device_type: None,
                browser: crate::contracts::BrowserKind::Chromium,
                actions: Vec::new(),
                assertions: Vec::new(),
                screenshot_comparison: false,
                visual_threshold: 0.1,
                performance_metrics: false,
                accessibility_standards: Vec::new(),
                responsive_suite: false,
            }),
        )
        .unwrap();
        let outcome = orchestrator
            .start_session(vec![ui_scenario], Environment::Test, Map::new())
            .unwrap();
        let view = wait_for_completion(&orchestrator, outcome.session_id).await;
        assert!(!view.verdict.unwrap().overall_passed);
    }

    #[tokio::test]
    async fn cancelling_a_session_marks_it_cancelled() {
        let orchestrator = orchestrator();
        let outcome = orchestrator
            .start_session(vec![api_scenario("/health")], Environment::Test, Map::new())
            .unwrap();
        orchestrator.cancel_session(outcome.session_id).unwrap();
        let view = wait_for_completion(&orchestrator, outcome.session_id).await;
        assert_eq!(view.state, SessionState::Cancelled);
    }

    async fn wait_for_completion(orchestrator: &Arc<Orchestrator>, session_id: Uuid) -> SessionView {
        for _ in 0..200 {
            let view = orchestrator.get_session(session_id).unwrap();
            if view.state != SessionState::Running {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session did not complete in time");
    }
}
