use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contracts::{AggregatedResults, TestExecution, TestResult};

use super::plan::PhaseName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Pending,
    Running,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub phase: PhaseName,
    pub state: PhaseState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub scenario_count: usize,
}

impl PhaseStatus {
    pub fn pending(phase: PhaseName, scenario_count: usize) -> Self {
        Self {
            phase,
            state: PhaseState::Pending,
            passed: None,
            score: None,
            scenario_count,
        }
    }
}

/// The orchestrator's composite verdict over every phase that ran (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub overall_passed: bool,
    pub overall_score: f64,
    pub quality_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    Completed,
    Cancelled,
}

/// A read-only snapshot of a session's progress, returned by `GET
/// /sessions/{id}` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: SessionState,
    pub phases: Vec<PhaseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_report: Option<AggregatedResults>,
    pub started_at: DateTime<Utc>,
}

/// Orchestrator-owned mutable state for one in-flight or completed
/// session (§3 ownership note: "The Orchestrator exclusively owns a live
/// TestExecution and its pending TestResult").
pub struct SessionHandle {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub cancelled: Arc<AtomicBool>,
    pub state: SessionState,
    pub phases: Vec<PhaseStatus>,
    pub executions: HashMap<Uuid, TestExecution>,
    pub results: Vec<TestResult>,
    pub verdict: Option<Verdict>,
    pub aggregated_report: Option<AggregatedResults>,
}

impl SessionHandle {
    pub fn new(session_id: Uuid, phases: Vec<PhaseStatus>) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            cancelled: Arc::new(AtomicBool::new(false)),
            state: SessionState::Running,
            phases,
            executions: HashMap::new(),
            results: Vec::new(),
            verdict: None,
            aggregated_report: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn request_cancellation(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn phase_mut(&mut self, phase: PhaseName) -> &mut PhaseStatus {
        self.phases
            .iter_mut()
            .find(|p| p.phase == phase)
            .expect("all phases are seeded at session creation")
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session_id,
            state: self.state,
            phases: self.phases.clone(),
            verdict: self.verdict.clone(),
            aggregated_report: self.aggregated_report.clone(),
            started_at: self.started_at,
        }
    }
}
