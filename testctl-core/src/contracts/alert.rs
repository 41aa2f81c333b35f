use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    TestFailure,
    QualityRegression,
    PerformanceDegradation,
    AnomalyDetected,
    SessionCancelled,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Open,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert {id}: cannot acknowledge from state {state:?}")]
    CannotAcknowledge { id: Uuid, state: AlertState },
    #[error("alert {id}: already resolved")]
    AlreadyResolved { id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_id: Option<Uuid>,
    #[serde(default)]
    pub current_values: HashMap<String, f64>,
    #[serde(default)]
    pub threshold_values: HashMap<String, f64>,
    pub state: AlertState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        priority: AlertPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            priority,
            title: title.into(),
            message: message.into(),
            details: HashMap::new(),
            test_result_id: None,
            scenario_id: None,
            current_values: HashMap::new(),
            threshold_values: HashMap::new(),
            state: AlertState::Open,
            created_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    pub fn acknowledge(&mut self, by: impl Into<String>) -> Result<(), AlertError> {
        if self.state != AlertState::Open {
            return Err(AlertError::CannotAcknowledge {
                id: self.id,
                state: self.state,
            });
        }
        self.state = AlertState::Acknowledged;
        self.acknowledged_by = Some(by.into());
        self.acknowledged_at = Some(Utc::now());
        Ok(())
    }

    pub fn resolve(&mut self) -> Result<(), AlertError> {
        if self.state == AlertState::Resolved {
            return Err(AlertError::AlreadyResolved { id: self.id });
        }
        self.state = AlertState::Resolved;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledge_then_resolve() {
        let mut alert = Alert::new(AlertType::TestFailure, AlertPriority::High, "t", "m");
        alert.acknowledge("operator").unwrap();
        assert_eq!(alert.state, AlertState::Acknowledged);
        alert.resolve().unwrap();
        assert_eq!(alert.state, AlertState::Resolved);
    }

    #[test]
    fn open_can_resolve_directly() {
        let mut alert = Alert::new(AlertType::TestFailure, AlertPriority::High, "t", "m");
        alert.resolve().unwrap();
        assert_eq!(alert.state, AlertState::Resolved);
    }

    #[test]
    fn cannot_acknowledge_twice() {
        let mut alert = Alert::new(AlertType::TestFailure, AlertPriority::High, "t", "m");
        alert.acknowledge("a").unwrap();
        assert!(alert.acknowledge("b").is_err());
    }

    #[test]
    fn resolution_is_terminal() {
        let mut alert = Alert::new(AlertType::TestFailure, AlertPriority::High, "t", "m");
        alert.resolve().unwrap();
        assert!(alert.resolve().is_err());
    }
}
