use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::quality::QualityMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed
                | ExecutionState::Failed
                | ExecutionState::Timeout
                | ExecutionState::Cancelled
        )
    }

    /// Whether `self -> next` is a legal transition per the state machine
    /// in the platform's data model.
    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Timeout)
                | (Running, Cancelled)
        )
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("illegal transition from {from:?} to {to:?} for execution {id}")]
    IllegalTransition {
        id: Uuid,
        from: ExecutionState,
        to: ExecutionState,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestExecution {
    pub id: Uuid,
    pub scenario_id: Uuid,
    pub session_id: Uuid,
    pub state: ExecutionState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TestExecution {
    pub fn new(scenario_id: Uuid, session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            scenario_id,
            session_id,
            state: ExecutionState::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn transition(&mut self, next: ExecutionState) -> Result<(), ExecutionError> {
        if !self.state.can_transition_to(next) {
            return Err(ExecutionError::IllegalTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        let now = Utc::now();
        if next == ExecutionState::Running {
            self.started_at = Some(now);
        } else if next.is_terminal() {
            self.completed_at = Some(now);
            if let Some(started_at) = self.started_at {
                self.duration_ms = Some((now - started_at).num_milliseconds().max(0) as u64);
            }
        }
        self.state = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Input,
    TransientIo,
    PermanentIo,
    Configuration,
    Capacity,
    Internal,
    Timeout,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSubResult {
    pub status_code: u16,
    pub response_time_ms: u64,
    pub status_validation: bool,
    pub schema_validation: bool,
    pub headers_validation: bool,
    pub content_validation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiSubResult {
    pub action_success_rate: f64,
    pub assertion_success_rate: f64,
    pub visual_match: Option<bool>,
    pub visual_diff_ratio: Option<f64>,
    pub accessibility_score: f64,
    pub responsive_score: Option<f64>,
    pub load_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiQualitySubResult {
    pub overall_score: f64,
    pub overall_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub execution_id: Uuid,
    pub scenario_id: Uuid,
    /// Name of the executor that produced this result (`api_tester`,
    /// `browser_tester`, `quality_judge`, ...). The aggregator groups by
    /// this field for its per-service summaries.
    pub service: String,
    pub passed: bool,
    pub score: f64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_results: Option<ApiSubResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_results: Option<UiSubResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_quality_results: Option<AiQualitySubResult>,
    #[serde(default)]
    pub quality_scores: HashMap<QualityMetric, f64>,
    #[serde(default)]
    pub performance_metrics: HashMap<String, f64>,
    #[serde(default)]
    pub evidence_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl TestResult {
    pub fn failure(
        execution_id: Uuid,
        scenario_id: Uuid,
        service: impl Into<String>,
        duration_ms: u64,
        error_type: ErrorKind,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            scenario_id,
            service: service.into(),
            passed: false,
            score: 0.0,
            duration_ms,
            api_results: None,
            ui_results: None,
            ai_quality_results: None,
            quality_scores: HashMap::new(),
            performance_metrics: HashMap::new(),
            evidence_paths: Vec::new(),
            error_type: Some(error_type),
            error_message: Some(error_message.into()),
            recommendations: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_path_pending_running_completed() {
        let mut execution = TestExecution::new(Uuid::new_v4(), Uuid::new_v4());
        execution.transition(ExecutionState::Running).unwrap();
        execution.transition(ExecutionState::Completed).unwrap();
        assert!(execution.state.is_terminal());
        assert!(execution.duration_ms.is_some());
    }

    #[test]
    fn rejects_completed_to_running() {
        let mut execution = TestExecution::new(Uuid::new_v4(), Uuid::new_v4());
        execution.transition(ExecutionState::Running).unwrap();
        execution.transition(ExecutionState::Completed).unwrap();
        assert!(execution.transition(ExecutionState::Running).is_err());
    }

    #[test]
    fn pending_can_cancel_directly() {
        let mut execution = TestExecution::new(Uuid::new_v4(), Uuid::new_v4());
        execution.transition(ExecutionState::Cancelled).unwrap();
        assert_eq!(execution.state, ExecutionState::Cancelled);
    }
}
