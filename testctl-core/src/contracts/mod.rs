//! Typed schemas shared by every component (C1). These types are the wire
//! contract: every HTTP body the service binaries accept or return is one
//! of these, and every event published on the event bus carries one.

mod aggregate;
mod alert;
mod notification;
mod quality;
mod result;
mod scenario;

pub use aggregate::{
    AggregatedReportRequest, AggregatedResults, Anomaly, FailureEntry, PerformerEntry,
    QualityInsight, QualityInsightType, TestSummary, TrendAnalysis, TrendDirection,
};
pub use alert::{Alert, AlertError, AlertPriority, AlertState, AlertType};
pub use notification::{Channel, Notification, NotificationError, NotificationState};
pub use quality::{
    JudgeStrategy, QualityAssessmentRequest, QualityAssessmentResult, QualityMetric, QualityScore,
};
pub use result::{
    AiQualitySubResult, ApiSubResult, ErrorKind, ExecutionError, ExecutionState, TestExecution,
    TestResult, UiSubResult,
};
pub use scenario::{
    AccessibilityStandard, ActionKind, ApiTestSpec, AssertionKind, AiQualitySpec, BrowserKind,
    DeviceType, Environment, HttpMethod, JsonSchemaSubset, ScenarioCollection, ScenarioError,
    ScenarioResult, TestConfig, TestContext, TestScenario, TestType, UiAction, UiAssertion,
    UiTestSpec, ViewportSize,
};
