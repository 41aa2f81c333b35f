use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::contracts::{AggregatedResults, AlertPriority, AlertType, Channel, QualityInsightType, TestResult};

/// Days-of-week plus an optional UTC time-of-day window during which a
/// rule is allowed to fire. An empty `days` set never matches.
#[derive(Debug, Clone)]
pub struct ScheduleWindow {
    pub days: HashSet<Weekday>,
    pub window: Option<(NaiveTime, NaiveTime)>,
}

impl Default for ScheduleWindow {
    fn default() -> Self {
        use Weekday::*;
        Self {
            days: [Mon, Tue, Wed, Thu, Fri, Sat, Sun].into_iter().collect(),
            window: None,
        }
    }
}

impl ScheduleWindow {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn is_active(&self, at: DateTime<Utc>) -> bool {
        if !self.days.contains(&at.weekday()) {
            return false;
        }
        match self.window {
            None => true,
            Some((start, end)) => {
                let t = at.time();
                if start <= end {
                    t >= start && t <= end
                } else {
                    // window wraps midnight, e.g. 22:00-06:00
                    t >= start || t <= end
                }
            }
        }
    }
}

/// A rule-evaluation match, not yet a stored [`Alert`](crate::contracts::Alert).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AlertCandidate {
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, Value>,
    #[serde(default)]
    pub current_values: HashMap<String, f64>,
    #[serde(default)]
    pub threshold_values: HashMap<String, f64>,
    #[serde(default)]
    pub test_result_id: Option<Uuid>,
    #[serde(default)]
    pub scenario_id: Option<Uuid>,
}

/// Predicate plus delivery policy: which alert types the rule watches
/// for, the thresholds that must be crossed, who gets notified over
/// which channels, and the rate limiting that bounds how often it fires.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub name: String,
    pub alert_types: Vec<AlertType>,
    pub priority_threshold: AlertPriority,
    pub min_quality_score: Option<f64>,
    pub max_failure_rate: Option<f64>,
    pub recipients: Vec<String>,
    pub channels: Vec<Channel>,
    pub cooldown: Duration,
    pub max_notifications_per_hour: u32,
    pub schedule: ScheduleWindow,
    pub enabled: bool,
}

impl AlertRule {
    pub fn new(name: impl Into<String>, alert_types: Vec<AlertType>) -> Self {
        Self {
            name: name.into(),
            alert_types,
            priority_threshold: AlertPriority::Low,
            min_quality_score: None,
            max_failure_rate: None,
            recipients: Vec::new(),
            channels: Vec::new(),
            cooldown: Duration::minutes(15),
            max_notifications_per_hour: 10,
            schedule: ScheduleWindow::default(),
            enabled: true,
        }
    }

    /// Convenience constructor mirroring `alert_detection`'s
    /// `min_quality_score` / `max_failure_rate` fields.
    pub fn quality_gate(name: impl Into<String>, min_quality_score: f64, max_failure_rate: f64) -> Self {
        let mut rule = Self::new(name, vec![AlertType::TestFailure, AlertType::QualityRegression, AlertType::PerformanceDegradation]);
        rule.min_quality_score = Some(min_quality_score);
        rule.max_failure_rate = Some(max_failure_rate);
        rule
    }

    pub fn with_recipients(mut self, recipients: Vec<String>, channels: Vec<Channel>) -> Self {
        self.recipients = recipients;
        self.channels = channels;
        self
    }

    pub fn evaluate_result(&self, result: &TestResult) -> Option<AlertCandidate> {
        if !self.enabled || result.passed {
            return None;
        }
        if !self.alert_types.contains(&AlertType::TestFailure) {
            return None;
        }
        if let Some(min_quality) = self.min_quality_score {
            if result.score >= min_quality {
                return None;
            }
        }
        let priority = severity_for_score(result.score);
        if priority < self.priority_threshold {
            return None;
        }

        let mut details = HashMap::new();
        details.insert("service".to_string(), json!(result.service));
        if let Some(error_type) = &result.error_type {
            details.insert("error_type".to_string(), json!(format!("{error_type:?}")));
        }
        if let Some(message) = &result.error_message {
            details.insert("error_message".to_string(), json!(message));
        }

        let mut current_values = HashMap::new();
        current_values.insert("score".to_string(), result.score);
        current_values.insert("duration_ms".to_string(), result.duration_ms as f64);

        let mut threshold_values = HashMap::new();
        if let Some(min_quality) = self.min_quality_score {
            threshold_values.insert("min_quality_score".to_string(), min_quality);
        }

        Some(AlertCandidate {
            alert_type: AlertType::TestFailure,
            priority,
            title: format!("Test failure: scenario {}", result.scenario_id),
            message: result
                .error_message
                .clone()
                .unwrap_or_else(|| "scenario failed without an error message".to_string()),
            details,
            current_values,
            threshold_values,
            test_result_id: Some(result.execution_id),
            scenario_id: Some(result.scenario_id),
        })
    }

    pub fn evaluate_aggregate(&self, aggregate: &AggregatedResults) -> Vec<AlertCandidate> {
        let mut candidates = Vec::new();
        if !self.enabled {
            return candidates;
        }

        if self.alert_types.contains(&AlertType::PerformanceDegradation) {
            if let Some(max_failure_rate) = self.max_failure_rate {
                let failure_rate = 1.0 - aggregate.overall.success_rate;
                if aggregate.overall.total > 0 && failure_rate > max_failure_rate {
                    candidates.push(AlertCandidate {
                        alert_type: AlertType::PerformanceDegradation,
                        priority: AlertPriority::High,
                        title: "Failure rate exceeds threshold".to_string(),
                        message: format!(
                            "failure rate {:.1}% exceeds the configured {:.1}% ceiling",
                            failure_rate * 100.0,
                            max_failure_rate * 100.0
                        ),
                        details: HashMap::new(),
                        current_values: HashMap::from([("failure_rate".to_string(), failure_rate)]),
                        threshold_values: HashMap::from([("max_failure_rate".to_string(), max_failure_rate)]),
                        test_result_id: None,
                        scenario_id: None,
                    });
                }
            }
        }

        if self.alert_types.contains(&AlertType::QualityRegression) {
            for insight in &aggregate.quality_insights {
                if insight.insight_type != QualityInsightType::RecentRegression {
                    continue;
                }
                if insight.priority < self.priority_threshold {
                    continue;
                }
                candidates.push(AlertCandidate {
                    alert_type: AlertType::QualityRegression,
                    priority: insight.priority,
                    title: insight.title.clone(),
                    message: insight.description.clone(),
                    details: HashMap::new(),
                    current_values: HashMap::new(),
                    threshold_values: HashMap::new(),
                    test_result_id: None,
                    scenario_id: None,
                });
            }
        }

        candidates
    }
}

fn severity_for_score(score: f64) -> AlertPriority {
    if score < 0.2 {
        AlertPriority::Critical
    } else if score < 0.5 {
        AlertPriority::High
    } else if score < 0.8 {
        AlertPriority::Medium
    } else {
        AlertPriority::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn schedule_window_wraps_midnight() {
        let schedule = ScheduleWindow {
            days: ScheduleWindow::always().days,
            window: Some((NaiveTime::from_hms_opt(22, 0, 0).unwrap(), NaiveTime::from_hms_opt(6, 0, 0).unwrap())),
        };
        let inside = Utc.with_ymd_and_hms(2026, 1, 5, 23, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        assert!(schedule.is_active(inside));
        assert!(!schedule.is_active(outside));
    }

    #[test]
    fn low_priority_failures_are_filtered_below_threshold() {
        let mut rule = AlertRule::new("high-only", vec![AlertType::TestFailure]);
        rule.priority_threshold = AlertPriority::High;
        let mut result = crate::contracts::TestResult::failure(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "api_tester",
            100,
            crate::contracts::ErrorKind::Input,
            "minor validation issue",
        );
        result.score = 0.75; // -> Medium severity, below High threshold
        assert!(rule.evaluate_result(&result).is_none());
    }
}
