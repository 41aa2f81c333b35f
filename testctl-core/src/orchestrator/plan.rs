use serde::{Deserialize, Serialize};

use crate::contracts::{TestConfig, TestScenario, TestType};

/// The four fixed phases a session's scenarios are bucketed into (§4.6).
/// `Aggregation` always runs last and awaits every preceding phase; the
/// other three execute concurrently where the plan has scenarios for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    ApiProbes,
    UiFlows,
    QualityAssessments,
    Aggregation,
}

impl PhaseName {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseName::ApiProbes => "api_probes",
            PhaseName::UiFlows => "ui_flows",
            PhaseName::QualityAssessments => "quality_assessments",
            PhaseName::Aggregation => "aggregation",
        }
    }
}

/// A phased execution plan: which scenarios belong to which of the three
/// parallel phases. Aggregation has no scenarios of its own — it
/// summarises whatever the other three phases produced.
#[derive(Debug, Clone, Default)]
pub struct SessionPlan {
    pub api_probes: Vec<TestScenario>,
    pub ui_flows: Vec<TestScenario>,
    pub quality_assessments: Vec<TestScenario>,
}

impl SessionPlan {
    /// Groups scenarios by which phase their `test_type` and `config`
    /// belong to. `Integration`/`Performance`/`Security`/`Accessibility`
    /// scenarios carry a `Composite` config (§9 design note) and are
    /// routed to whichever of its API/UI sub-spec is present, API taking
    /// priority when both are set.
    pub fn build(scenarios: Vec<TestScenario>) -> Self {
        let mut plan = SessionPlan::default();
        for scenario in scenarios {
            match phase_for(&scenario) {
                Some(PhaseName::ApiProbes) => plan.api_probes.push(scenario),
                Some(PhaseName::UiFlows) => plan.ui_flows.push(scenario),
                Some(PhaseName::QualityAssessments) => plan.quality_assessments.push(scenario),
                _ => {}
            }
        }
        plan
    }

    pub fn phases_with_work(&self) -> Vec<PhaseName> {
        let mut phases = Vec::new();
        if !self.api_probes.is_empty() {
            phases.push(PhaseName::ApiProbes);
        }
        if !self.ui_flows.is_empty() {
            phases.push(PhaseName::UiFlows);
        }
        if !self.quality_assessments.is_empty() {
            phases.push(PhaseName::QualityAssessments);
        }
        phases
    }

    pub fn total_scenarios(&self) -> usize {
        self.api_probes.len() + self.ui_flows.len() + self.quality_assessments.len()
    }

    /// Human-readable plan summary returned from `POST /sessions` (§6).
    pub fn summary(&self) -> String {
        format!(
            "api_probes={} ui_flows={} quality_assessments={} aggregation=1",
            self.api_probes.len(),
            self.ui_flows.len(),
            self.quality_assessments.len()
        )
    }
}

fn phase_for(scenario: &TestScenario) -> Option<PhaseName> {
    match scenario.test_type {
        TestType::Api => Some(PhaseName::ApiProbes),
        TestType::Ui => Some(PhaseName::UiFlows),
        TestType::AiQuality => Some(PhaseName::QualityAssessments),
        TestType::Integration
        | TestType::Performance
        | TestType::Security
        | TestType::Accessibility => match &scenario.config {
            TestConfig::Composite { api: Some(_), .. } => Some(PhaseName::ApiProbes),
            TestConfig::Composite { ui: Some(_), .. } => Some(PhaseName::UiFlows),
            TestConfig::Api(_) => Some(PhaseName::ApiProbes),
            TestConfig::Ui(_) => Some(PhaseName::UiFlows),
            TestConfig::AiQuality(_) => Some(PhaseName::QualityAssessments),
            TestConfig::Composite { api: None, ui: None } => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ApiTestSpec, HttpMethod, TestConfig};
    use std::collections::HashMap;

    fn api_scenario() -> TestScenario {
        TestScenario::new(
            "probe",
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
                response_time_threshold_ms: 1000,
            }),
        )
        .unwrap()
    }

    #[test]
    fn api_scenario_lands_in_api_probes() {
        let plan = SessionPlan::build(vec![api_scenario()]);
        assert_eq!(plan.api_probes.len(), 1);
        assert!(plan.ui_flows.is_empty());
        assert_eq!(plan.phases_with_work(), vec![PhaseName::ApiProbes]);
    }

    #[test]
    fn empty_plan_has_no_phases_with_work() {
        let plan = SessionPlan::build(Vec::new());
        assert!(plan.phases_with_work().is_empty());
    }
}
