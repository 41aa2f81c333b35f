use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::quality::QualityMetric;

/// Errors raised while validating or constructing a [`TestScenario`].
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario {id}: config does not match test_type {test_type:?}")]
    ConfigMismatch { id: Uuid, test_type: TestType },
    #[error("scenario {id}: priority {priority} out of range [1,10]")]
    PriorityOutOfRange { id: Uuid, priority: u8 },
    #[error("scenario {id}: timeout_seconds {timeout_seconds} out of range [1,3600]")]
    TimeoutOutOfRange { id: Uuid, timeout_seconds: u32 },
    #[error("scenario {id}: retry_count {retry_count} out of range [0,10]")]
    RetryCountOutOfRange { id: Uuid, retry_count: u8 },
    #[error("scenario {id}: quality threshold for {metric:?} is {value}, must be in [0,1]")]
    QualityThresholdOutOfRange {
        id: Uuid,
        metric: QualityMetric,
        value: f64,
    },
    #[error("scenario {0}: name must not be empty")]
    EmptyName(Uuid),
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Api,
    Ui,
    AiQuality,
    Integration,
    Performance,
    Security,
    Accessibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSchemaSubset {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTestSpec {
    pub endpoint: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query_params: HashMap<String, String>,
    #[serde(default)]
    pub path_params: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<Value>,
    pub expected_status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_response_schema: Option<JsonSchemaSubset>,
    pub response_time_threshold_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    Chromium,
    Firefox,
    Webkit,
}

impl Default for BrowserKind {
    fn default() -> Self {
        BrowserKind::Chromium
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    Type,
    Select,
    Hover,
    Wait,
    Scroll,
    Press,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiAction {
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    Visible,
    Hidden,
    Text,
    Value,
    Count,
    Url,
    Title,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiAssertion {
    pub kind: AssertionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessibilityStandard {
    Wcag2A,
    Wcag2Aa,
    Wcag21Aa,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiTestSpec {
    pub page_url: String,
    pub viewport_size: ViewportSize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
    #[serde(default = "default_browser")]
    pub browser: BrowserKind,
    #[serde(default)]
    pub actions: Vec<UiAction>,
    #[serde(default)]
    pub assertions: Vec<UiAssertion>,
    #[serde(default)]
    pub screenshot_comparison: bool,
    #[serde(default = "default_visual_threshold")]
    pub visual_threshold: f64,
    #[serde(default)]
    pub performance_metrics: bool,
    #[serde(default)]
    pub accessibility_standards: Vec<AccessibilityStandard>,
    #[serde(default)]
    pub responsive_suite: bool,
}

fn default_browser() -> BrowserKind {
    BrowserKind::Chromium
}

fn default_visual_threshold() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiQualitySpec {
    pub input_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_data: Option<Value>,
    pub assessment_models: Vec<String>,
    pub quality_metrics: Vec<QualityMetric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_outputs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_scores: Option<HashMap<QualityMetric, f64>>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

/// Discriminated union of type-specific test configuration, keyed by
/// `test_type` at the JSON boundary. Constructing a [`TestScenario`] with a
/// mismatched pair is rejected by [`TestScenario::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestConfig {
    Api(ApiTestSpec),
    Ui(UiTestSpec),
    AiQuality(AiQualitySpec),
    /// Integration/Performance/Security/Accessibility scenarios reuse the
    /// API or UI spec shape; `test_type` records the semantic intent while
    /// `config` carries whichever sub-spec actually drives execution.
    Composite {
        api: Option<ApiTestSpec>,
        ui: Option<UiTestSpec>,
    },
}

impl TestConfig {
    fn matches(&self, test_type: TestType) -> bool {
        match (self, test_type) {
            (TestConfig::Api(_), TestType::Api) => true,
            (TestConfig::Ui(_), TestType::Ui) => true,
            (TestConfig::AiQuality(_), TestType::AiQuality) => true,
            (
                TestConfig::Composite { .. },
                TestType::Integration
                | TestType::Performance
                | TestType::Security
                | TestType::Accessibility,
            ) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScenario {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub test_type: TestType,
    pub priority: u8,
    pub timeout_seconds: u32,
    pub retry_count: u8,
    pub config: TestConfig,
    #[serde(default)]
    pub expected_outcomes: Vec<String>,
    #[serde(default)]
    pub quality_thresholds: HashMap<QualityMetric, f64>,
    #[serde(default)]
    pub performance_thresholds: HashMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestScenario {
    pub fn new(
        name: impl Into<String>,
        test_type: TestType,
        config: TestConfig,
    ) -> ScenarioResult<Self> {
        let now = Utc::now();
        let scenario = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            test_type,
            priority: 5,
            timeout_seconds: 30,
            retry_count: 0,
            config,
            expected_outcomes: Vec::new(),
            quality_thresholds: HashMap::new(),
            performance_thresholds: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        scenario.validate()?;
        Ok(scenario)
    }

    /// Produces a new version of this scenario with `updated_at` advanced.
    /// All other immutable fields are carried over unless overridden by `f`.
    pub fn revise(&self, f: impl FnOnce(&mut TestScenario)) -> ScenarioResult<TestScenario> {
        let mut next = self.clone();
        f(&mut next);
        next.updated_at = Utc::now();
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> ScenarioResult<()> {
        if self.name.trim().is_empty() {
            return Err(ScenarioError::EmptyName(self.id));
        }
        if !(1..=10).contains(&self.priority) {
            return Err(ScenarioError::PriorityOutOfRange {
                id: self.id,
                priority: self.priority,
            });
        }
        if !(1..=3600).contains(&self.timeout_seconds) {
            return Err(ScenarioError::TimeoutOutOfRange {
                id: self.id,
                timeout_seconds: self.timeout_seconds,
            });
        }
        if self.retry_count > 10 {
            return Err(ScenarioError::RetryCountOutOfRange {
                id: self.id,
                retry_count: self.retry_count,
            });
        }
        if !self.config.matches(self.test_type) {
            return Err(ScenarioError::ConfigMismatch {
                id: self.id,
                test_type: self.test_type,
            });
        }
        for (metric, value) in &self.quality_thresholds {
            if !(0.0..=1.0).contains(value) {
                return Err(ScenarioError::QualityThresholdOutOfRange {
                    id: self.id,
                    metric: *metric,
                    value: *value,
                });
            }
        }
        Ok(())
    }
}

/// A named, ordered collection of scenario ids, persisted as
/// `collection_{name}.json` per the platform's persisted-state layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCollection {
    pub name: String,
    pub description: String,
    pub scenario_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Test,
    Staging,
    Production,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestContext {
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub environment: Environment,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Auth headers injected by the orchestrator (from environment or
    /// config) ahead of a scenario's own `spec.headers` (§4.1: "Headers
    /// are merged as {auth-injected} ⊕ {spec headers}, the latter
    /// winning on conflict").
    #[serde(default)]
    pub auth_headers: HashMap<String, String>,
}

impl TestContext {
    pub fn new(session_id: Uuid, environment: Environment) -> Self {
        Self {
            session_id,
            user_id: None,
            environment,
            metadata: HashMap::new(),
            tags: Vec::new(),
            auth_headers: HashMap::new(),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        self.metadata.get("base_url").and_then(Value::as_str)
    }

    /// `{auth-injected} ⊕ {spec headers}`, the latter winning on
    /// conflict (§4.1).
    pub fn merge_headers(&self, spec_headers: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = self.auth_headers.clone();
        for (name, value) in spec_headers {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_spec() -> ApiTestSpec {
        ApiTestSpec {
            endpoint: "/health".into(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            query_params: HashMap::new(),
            path_params: HashMap::new(),
            request_body: None,
            expected_status: 200,
            expected_response_schema: None,
            response_time_threshold_ms: 1000,
        }
    }

    #[test]
    fn spec_headers_win_over_auth_headers_on_conflict() {
        let mut context = TestContext::new(Uuid::new_v4(), Environment::Test);
        context.auth_headers.insert("Authorization".into(), "Bearer injected".into());
        context.auth_headers.insert("X-Trace-Id".into(), "trace-1".into());

        let mut spec_headers = HashMap::new();
        spec_headers.insert("Authorization".into(), "Bearer override".into());

        let merged = context.merge_headers(&spec_headers);
        assert_eq!(merged.get("Authorization").map(String::as_str), Some("Bearer override"));
        assert_eq!(merged.get("X-Trace-Id").map(String::as_str), Some("trace-1"));
    }

    #[test]
    fn rejects_mismatched_config() {
        let err = TestScenario::new("health", TestType::Ui, TestConfig::Api(api_spec()))
            .expect_err("mismatch should be rejected");
        assert!(matches!(err, ScenarioError::ConfigMismatch { .. }));
    }

    #[test]
    fn accepts_matching_config() {
        let scenario =
            TestScenario::new("health", TestType::Api, TestConfig::Api(api_spec())).unwrap();
        assert_eq!(scenario.priority, 5);
    }

    #[test]
    fn revise_advances_updated_at_and_keeps_identity() {
        let scenario =
            TestScenario::new("health", TestType::Api, TestConfig::Api(api_spec())).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let revised = scenario
            .revise(|s| s.priority = 8)
            .expect("revision should validate");
        assert_eq!(revised.id, scenario.id);
        assert_eq!(revised.priority, 8);
        assert!(revised.updated_at > scenario.updated_at);
    }

    #[test]
    fn rejects_quality_threshold_out_of_range() {
        let mut scenario =
            TestScenario::new("health", TestType::Api, TestConfig::Api(api_spec())).unwrap();
        scenario
            .quality_thresholds
            .insert(QualityMetric::Safety, 1.4);
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::QualityThresholdOutOfRange { .. })
        ));
    }
}
