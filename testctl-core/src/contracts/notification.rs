use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Slack,
    Webhook,
    Console,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationState {
    Pending,
    Sent,
    Delivered,
    Failed,
    Retrying,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification {0}: cannot mutate after reaching a final state")]
    Final(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub subject: String,
    pub content: String,
    pub state: NotificationState,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        alert_id: Uuid,
        channel: Channel,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            alert_id,
            channel,
            recipient: recipient.into(),
            subject: subject.into(),
            content: content.into(),
            state: NotificationState::Pending,
            retry_count: 0,
            max_retries,
            created_at: now,
            next_retry_at: None,
            last_error: None,
            updated_at: now,
        }
    }

    fn is_final(&self) -> bool {
        matches!(
            self.state,
            NotificationState::Delivered | NotificationState::Failed
        ) && self.retry_count >= self.max_retries
    }

    pub fn mark_sent(&mut self) -> Result<(), NotificationError> {
        self.guard_mutation()?;
        self.state = NotificationState::Sent;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_delivered(&mut self) -> Result<(), NotificationError> {
        self.guard_mutation()?;
        self.state = NotificationState::Delivered;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a delivery failure. If `retry_count < max_retries` the
    /// notification transitions to RETRYING with a linear back-off delay
    /// of `30 * (retry_count + 1)` seconds; otherwise it becomes a final
    /// FAILED and is retained for audit.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), NotificationError> {
        if self.state == NotificationState::Delivered {
            return Err(NotificationError::Final(self.id));
        }
        self.last_error = Some(error.into());
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.state = NotificationState::Retrying;
            let delay_seconds = 30 * self.retry_count;
            self.next_retry_at = Some(Utc::now() + chrono::Duration::seconds(delay_seconds as i64));
        } else {
            self.state = NotificationState::Failed;
            self.next_retry_at = None;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    fn guard_mutation(&self) -> Result<(), NotificationError> {
        if self.state == NotificationState::Delivered {
            Err(NotificationError::Final(self.id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivered_is_terminal() {
        let mut n = Notification::new(Uuid::new_v4(), Channel::Console, "ops", "s", "c", 3);
        n.mark_sent().unwrap();
        n.mark_delivered().unwrap();
        assert!(n.mark_delivered().is_err());
        assert!(n.mark_failed("late failure").is_err());
    }

    #[test]
    fn failure_retries_with_linear_backoff() {
        let mut n = Notification::new(Uuid::new_v4(), Channel::Email, "ops", "s", "c", 3);
        n.mark_failed("smtp down").unwrap();
        assert_eq!(n.state, NotificationState::Retrying);
        assert_eq!(n.retry_count, 1);
        let delay = (n.next_retry_at.unwrap() - n.created_at).num_seconds();
        assert!((29..=31).contains(&delay));
    }

    #[test]
    fn exhausts_retries_into_final_failed() {
        let mut n = Notification::new(Uuid::new_v4(), Channel::Email, "ops", "s", "c", 2);
        n.mark_failed("e1").unwrap();
        n.mark_failed("e2").unwrap();
        assert_eq!(n.state, NotificationState::Failed);
        assert_eq!(n.retry_count, 2);
    }
}
