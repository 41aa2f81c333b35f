//! Rule-evaluated alerts routed through rate-limited, multi-channel
//! delivery with acknowledgement and resolution (C7).

mod channel;
mod rule;
mod template;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub use channel::{ConsoleChannel, EmailChannel, FileChannel, NotificationChannel, SendmailChannel, SlackChannel, WebhookChannel};
pub use rule::{AlertCandidate, AlertRule, ScheduleWindow};
pub use template::TemplateSet;

use crate::contracts::{AggregatedResults, Alert, AlertError, AlertState, Channel, Notification, NotificationState, TestResult};
use crate::event_bus::EventBus;

pub const SERVICE_NAME: &str = "alerts";
const DELIVERY_BATCH_SIZE: usize = 10;

#[derive(Debug, Error)]
pub enum AlertEngineError {
    #[error(transparent)]
    Alert(#[from] AlertError),
    #[error("alert {0} not found")]
    NotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, AlertEngineError>;

struct RuleState {
    last_fired: Option<DateTime<Utc>>,
    hour_start: DateTime<Utc>,
    hour_count: u32,
}

impl RuleState {
    fn fresh(at: DateTime<Utc>) -> Self {
        Self { last_fired: None, hour_start: at, hour_count: 0 }
    }

    fn admits(&mut self, at: DateTime<Utc>, cooldown: Duration, hourly_cap: u32) -> bool {
        if at - self.hour_start >= Duration::hours(1) {
            self.hour_start = at;
            self.hour_count = 0;
        }
        if let Some(last_fired) = self.last_fired {
            if at - last_fired < cooldown {
                return false;
            }
        }
        if self.hour_count >= hourly_cap {
            return false;
        }
        self.last_fired = Some(at);
        self.hour_count += 1;
        true
    }
}

/// Owns the rule set, the stored alerts, the pending notification
/// queue and the registered delivery channels. Evaluation is
/// synchronous; delivery and cleanup run as background workers spawned
/// by the hosting binary.
pub struct AlertEngine {
    rules: Mutex<Vec<AlertRule>>,
    rule_state: Mutex<HashMap<String, RuleState>>,
    alerts: Mutex<HashMap<Uuid, Alert>>,
    queue: Mutex<VecDeque<Notification>>,
    channels: HashMap<Channel, Arc<dyn NotificationChannel>>,
    templates: TemplateSet,
    max_retries: u32,
    source_service: String,
}

impl AlertEngine {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, max_retries: u32) -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            rule_state: Mutex::new(HashMap::new()),
            alerts: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            channels: channels.into_iter().map(|c| (c.kind(), c)).collect(),
            templates: TemplateSet::default_set(),
            max_retries,
            source_service: SERVICE_NAME.to_string(),
        }
    }

    pub fn add_rule(&self, rule: AlertRule) {
        self.rule_state.lock().unwrap().entry(rule.name.clone()).or_insert_with(|| RuleState::fresh(Utc::now()));
        self.rules.lock().unwrap().push(rule);
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.lock().unwrap().clone()
    }

    /// Evaluates every enabled rule whose schedule is active at `at`
    /// against `result`, admits through cooldown/hourly-cap rate
    /// limiting, and enqueues one [`Notification`] per recipient x
    /// channel for each admitted candidate.
    pub fn evaluate_test_result(&self, result: &TestResult, at: DateTime<Utc>) -> Vec<Uuid> {
        let mut created = Vec::new();
        let rules = self.rules.lock().unwrap();
        let mut rule_state = self.rule_state.lock().unwrap();
        for rule in rules.iter() {
            if !rule.schedule.is_active(at) {
                continue;
            }
            let Some(candidate) = rule.evaluate_result(result) else { continue };
            let state = rule_state.entry(rule.name.clone()).or_insert_with(|| RuleState::fresh(at));
            if !state.admits(at, rule.cooldown, rule.max_notifications_per_hour) {
                continue;
            }
            created.push(self.admit(candidate, rule));
        }
        created
    }

    pub fn evaluate_aggregated_results(&self, aggregate: &AggregatedResults, at: DateTime<Utc>) -> Vec<Uuid> {
        let mut created = Vec::new();
        let rules = self.rules.lock().unwrap();
        let mut rule_state = self.rule_state.lock().unwrap();
        for rule in rules.iter() {
            if !rule.schedule.is_active(at) {
                continue;
            }
            for candidate in rule.evaluate_aggregate(aggregate) {
                let state = rule_state.entry(rule.name.clone()).or_insert_with(|| RuleState::fresh(at));
                if !state.admits(at, rule.cooldown, rule.max_notifications_per_hour) {
                    continue;
                }
                created.push(self.admit(candidate, rule));
            }
        }
        created
    }

    fn admit(&self, candidate: AlertCandidate, rule: &AlertRule) -> Uuid {
        self.store_and_enqueue(candidate, &rule.recipients, &rule.channels)
    }

    /// The `/alert` contract operation: an operator- or executor-submitted
    /// alert that bypasses rule matching and rate limiting entirely — it is
    /// a direct request to notify, not a derived observation.
    pub fn submit_custom_alert(&self, candidate: AlertCandidate, recipients: &[String], channels: &[Channel]) -> Uuid {
        self.store_and_enqueue(candidate, recipients, channels)
    }

    fn store_and_enqueue(&self, candidate: AlertCandidate, recipients: &[String], channels: &[Channel]) -> Uuid {
        let mut alert = Alert::new(candidate.alert_type, candidate.priority, candidate.title, candidate.message);
        alert.details = candidate.details;
        alert.current_values = candidate.current_values;
        alert.threshold_values = candidate.threshold_values;
        alert.test_result_id = candidate.test_result_id;
        alert.scenario_id = candidate.scenario_id;
        let alert_id = alert.id;

        let mut queue = self.queue.lock().unwrap();
        for recipient in recipients {
            for channel in channels {
                let (subject, content) = self.templates.render(&alert, &self.source_service, *channel);
                queue.push_back(Notification::new(alert.id, *channel, recipient.clone(), subject, content, self.max_retries));
            }
        }
        self.alerts.lock().unwrap().insert(alert_id, alert);
        alert_id
    }

    pub fn get(&self, id: Uuid) -> Option<Alert> {
        self.alerts.lock().unwrap().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().values().cloned().collect()
    }

    pub fn list_open(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().values().filter(|a| a.state != AlertState::Resolved).cloned().collect()
    }

    pub fn acknowledge(&self, id: Uuid, by: impl Into<String>) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap();
        let alert = alerts.get_mut(&id).ok_or(AlertEngineError::NotFound(id))?;
        alert.acknowledge(by)?;
        Ok(())
    }

    pub fn resolve(&self, id: Uuid) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap();
        let alert = alerts.get_mut(&id).ok_or(AlertEngineError::NotFound(id))?;
        alert.resolve()?;
        Ok(())
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Delivers up to [`DELIVERY_BATCH_SIZE`] due notifications
    /// concurrently. A channel or alert lookup miss counts as a failed
    /// delivery for that notification only; it never blocks the rest
    /// of the batch (§4.5, §5).
    pub async fn run_delivery_tick(&self) {
        let due = {
            let mut queue = self.queue.lock().unwrap();
            let now = Utc::now();
            let mut taken = Vec::new();
            let mut remaining = VecDeque::new();
            while let Some(notification) = queue.pop_front() {
                let is_due = match notification.state {
                    NotificationState::Pending => true,
                    NotificationState::Retrying => notification.next_retry_at.map(|at| at <= now).unwrap_or(true),
                    _ => false,
                };
                if is_due && taken.len() < DELIVERY_BATCH_SIZE {
                    taken.push(notification);
                } else {
                    remaining.push_back(notification);
                }
            }
            *queue = remaining;
            taken
        };
        if due.is_empty() {
            return;
        }

        let alerts = self.alerts.lock().unwrap().clone();
        let deliveries = due.into_iter().map(|mut notification| {
            let channel = self.channels.get(&notification.channel).cloned();
            let alert = alerts.get(&notification.alert_id).cloned();
            async move {
                let delivered = match (&channel, &alert) {
                    (Some(channel), Some(alert)) => channel.send(&notification, alert).await,
                    _ => false,
                };
                if delivered {
                    let _ = notification.mark_sent();
                    let _ = notification.mark_delivered();
                } else {
                    let _ = notification.mark_failed("channel delivery did not succeed");
                }
                notification
            }
        });
        let delivered = futures::future::join_all(deliveries).await;
        let mut queue = self.queue.lock().unwrap();
        for notification in delivered {
            queue.push_back(notification);
        }
    }

    pub fn spawn_delivery_worker(self: &Arc<Self>, tick: StdDuration) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                engine.run_delivery_tick().await;
                tokio::time::sleep(tick).await;
            }
        })
    }

    /// Drops alerts older than 7 days and terminal (SENT/DELIVERED/FAILED)
    /// notifications older than 7 days (§4.5).
    pub fn cleanup(&self) {
        let cutoff = Utc::now() - Duration::days(7);
        self.alerts.lock().unwrap().retain(|_, alert| alert.created_at >= cutoff);
        self.queue.lock().unwrap().retain(|notification| {
            let terminal = matches!(
                notification.state,
                NotificationState::Sent | NotificationState::Delivered | NotificationState::Failed
            );
            !terminal || notification.updated_at >= cutoff
        });
    }

    pub fn spawn_cleanup_worker(self: &Arc<Self>, interval: StdDuration) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                engine.cleanup();
            }
        })
    }

    /// Subscribes to `result.completed` and evaluates every rule
    /// against each incoming result, mirroring the aggregator's own
    /// event-bus listener.
    pub fn spawn_event_bus_listener(self: &Arc<Self>, event_bus: &EventBus) -> tokio::task::JoinHandle<()> {
        let mut receiver = event_bus.subscribe("result.completed");
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(value) => match serde_json::from_value::<TestResult>(value) {
                        Ok(result) => {
                            engine.evaluate_test_result(&result, Utc::now());
                        }
                        Err(error) => warn!(%error, "alert engine could not decode result.completed payload"),
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "alert engine event bus listener lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{AlertType, ErrorKind};

    fn failing_result(score: f64) -> TestResult {
        let mut result = TestResult::failure(Uuid::new_v4(), Uuid::new_v4(), "api_tester", 50, ErrorKind::Internal, "boom");
        result.score = score;
        result
    }

    fn engine_with_console() -> AlertEngine {
        let engine = AlertEngine::new(vec![Arc::new(ConsoleChannel)], 3);
        let rule = AlertRule::new("failure-rule", vec![AlertType::TestFailure]).with_recipients(vec!["ops@example.test".into()], vec![Channel::Console]);
        engine.add_rule(rule);
        engine
    }

    #[test]
    fn cooldown_and_hourly_cap_bound_how_often_a_rule_fires() {
        let engine = engine_with_console();
        let base = Utc::now();
        let result = failing_result(0.1);

        assert_eq!(engine.evaluate_test_result(&result, base).len(), 1);
        assert!(engine.evaluate_test_result(&result, base + Duration::minutes(10)).is_empty());
        assert_eq!(engine.evaluate_test_result(&result, base + Duration::minutes(20)).len(), 1);
    }

    #[test]
    fn hourly_cap_blocks_further_firing_within_the_hour() {
        let engine = engine_with_console();
        {
            let mut rules = engine.rules.lock().unwrap();
            rules[0].max_notifications_per_hour = 2;
        }
        let base = Utc::now();
        let result = failing_result(0.1);
        assert_eq!(engine.evaluate_test_result(&result, base).len(), 1);
        assert_eq!(engine.evaluate_test_result(&result, base + Duration::minutes(20)).len(), 1);
        assert!(engine.evaluate_test_result(&result, base + Duration::minutes(40)).is_empty());
    }

    #[test]
    fn acknowledge_then_resolve_moves_through_the_state_machine() {
        let engine = engine_with_console();
        let ids = engine.evaluate_test_result(&failing_result(0.05), Utc::now());
        let id = ids[0];
        engine.acknowledge(id, "oncall").unwrap();
        assert_eq!(engine.get(id).unwrap().state, AlertState::Acknowledged);
        engine.resolve(id).unwrap();
        assert_eq!(engine.get(id).unwrap().state, AlertState::Resolved);
        assert!(engine.resolve(id).is_err());
    }

    #[tokio::test]
    async fn delivery_tick_marks_console_notifications_delivered() {
        let engine = engine_with_console();
        engine.evaluate_test_result(&failing_result(0.05), Utc::now());
        assert_eq!(engine.queue_len(), 1);
        engine.run_delivery_tick().await;
        assert_eq!(engine.queue_len(), 1); // retained for audit, now terminal
    }

    #[test]
    fn cleanup_drops_old_alerts() {
        let engine = engine_with_console();
        let ids = engine.evaluate_test_result(&failing_result(0.05), Utc::now() - Duration::days(8));
        assert_eq!(ids.len(), 1);
        {
            let mut alerts = engine.alerts.lock().unwrap();
            if let Some(alert) = alerts.get_mut(&ids[0]) {
                alert.created_at = Utc::now() - Duration::days(8);
            }
        }
        engine.cleanup();
        assert!(engine.get(ids[0]).is_none());
    }
}
