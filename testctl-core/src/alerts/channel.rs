use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use lettre::message::Mailbox;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde_json::json;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{EmailChannelSection, SlackChannelSection, WebhookChannelSection};
use crate::contracts::{Alert, Channel, Notification};

/// One delivery mechanism for a [`Notification`]. Implementations never
/// panic and never propagate errors — a failed `send` simply returns
/// `false`, letting the engine's retry policy take over (§4.5).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> Channel;
    async fn send(&self, notification: &Notification, alert: &Alert) -> bool;
    fn validate_config(&self) -> bool;
}

pub struct ConsoleChannel;

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn kind(&self) -> Channel {
        Channel::Console
    }

    async fn send(&self, notification: &Notification, alert: &Alert) -> bool {
        info!(alert_id = %alert.id, recipient = %notification.recipient, subject = %notification.subject, "console notification");
        println!("[{:?}] {}: {}", alert.priority, notification.subject, notification.content);
        true
    }

    fn validate_config(&self) -> bool {
        true
    }
}

pub struct FileChannel {
    log_directory: PathBuf,
}

impl FileChannel {
    pub fn new(log_directory: impl Into<PathBuf>) -> Self {
        Self { log_directory: log_directory.into() }
    }
}

#[async_trait]
impl NotificationChannel for FileChannel {
    fn kind(&self) -> Channel {
        Channel::File
    }

    async fn send(&self, notification: &Notification, alert: &Alert) -> bool {
        if tokio::fs::create_dir_all(&self.log_directory).await.is_err() {
            return false;
        }
        let path = self.log_directory.join(format!("notifications_{}.log", Utc::now().format("%Y%m%d")));
        let line = format!(
            "[{}] [{:?}] {}: {}\n",
            Utc::now().to_rfc3339(),
            alert.priority,
            notification.subject,
            notification.content
        );
        match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(mut file) => file.write_all(line.as_bytes()).await.is_ok(),
            Err(error) => {
                warn!(%error, path = %path.display(), "failed to append notification log");
                false
            }
        }
    }

    fn validate_config(&self) -> bool {
        true
    }
}

pub struct WebhookChannel {
    client: Client,
    config: WebhookChannelSection,
}

impl WebhookChannel {
    pub fn new(client: Client, config: WebhookChannelSection) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn kind(&self) -> Channel {
        Channel::Webhook
    }

    async fn send(&self, notification: &Notification, alert: &Alert) -> bool {
        if !self.validate_config() {
            return false;
        }
        let body = json!({
            "alert_id": alert.id,
            "alert_type": format!("{:?}", alert.alert_type),
            "priority": format!("{:?}", alert.priority),
            "subject": notification.subject,
            "message": notification.content,
        });
        let method = if self.config.method.eq_ignore_ascii_case("PUT") {
            reqwest::Method::PUT
        } else {
            reqwest::Method::POST
        };
        match self.client.request(method, &self.config.webhook_url).json(&body).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                warn!(%error, alert_id = %alert.id, "webhook delivery failed");
                false
            }
        }
    }

    fn validate_config(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }
}

pub struct SlackChannel {
    client: Client,
    config: SlackChannelSection,
}

impl SlackChannel {
    pub fn new(client: Client, config: SlackChannelSection) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn kind(&self) -> Channel {
        Channel::Slack
    }

    async fn send(&self, notification: &Notification, alert: &Alert) -> bool {
        if !self.validate_config() {
            return false;
        }
        let body = json!({
            "channel": self.config.default_channel,
            "text": format!("*{}*\n{}", notification.subject, notification.content),
        });
        match self.client.post(&self.config.webhook_url).json(&body).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                warn!(%error, alert_id = %alert.id, "slack delivery failed");
                false
            }
        }
    }

    fn validate_config(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }
}

pub struct EmailChannel {
    config: EmailChannelSection,
    sender: Mailbox,
}

impl EmailChannel {
    pub fn new(config: EmailChannelSection, sender: &str) -> Result<Self, lettre::address::AddressError> {
        Ok(Self { sender: sender.parse()?, config })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, notification: &Notification, alert: &Alert) -> bool {
        if !self.validate_config() {
            return false;
        }
        let Ok(to) = notification.recipient.parse::<Mailbox>() else {
            return false;
        };
        let Ok(message) = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(notification.subject.clone())
            .body(notification.content.clone())
        else {
            return false;
        };

        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_server)
        } else {
            Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.smtp_server))
        };
        let Ok(transport) = builder.map(|b| b.port(self.config.smtp_port).build()) else {
            return false;
        };
        match transport.send(message).await {
            Ok(_) => true,
            Err(error) => {
                warn!(%error, alert_id = %alert.id, "smtp delivery failed");
                false
            }
        }
    }

    fn validate_config(&self) -> bool {
        self.config.enabled && !self.config.smtp_server.is_empty()
    }
}

/// Shells out to a host-local `sendmail`-compatible MTA. Kept alongside
/// [`EmailChannel`]'s SMTP path for environments where the SMTP section
/// is unconfigured but a local MTA is reachable.
pub struct SendmailChannel;

#[async_trait]
impl NotificationChannel for SendmailChannel {
    fn kind(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, notification: &Notification, _alert: &Alert) -> bool {
        let mut command = Command::new("sendmail");
        command.arg(&notification.recipient);
        command.stdin(std::process::Stdio::piped());
        command.stdout(std::process::Stdio::null());
        command.stderr(std::process::Stdio::null());
        let Ok(mut child) = command.spawn() else {
            return false;
        };
        if let Some(mut stdin) = child.stdin.take() {
            let body = format!(
                "To: {}\nSubject: {}\nContent-Type: text/plain; charset=UTF-8\n\n{}\n",
                notification.recipient, notification.subject, notification.content
            );
            if stdin.write_all(body.as_bytes()).await.is_err() {
                return false;
            }
        }
        matches!(child.wait().await, Ok(status) if status.success())
    }

    fn validate_config(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::AlertPriority;

    #[tokio::test]
    async fn console_channel_always_delivers() {
        let channel = ConsoleChannel;
        let alert = Alert::new(crate::contracts::AlertType::Custom, AlertPriority::Low, "t", "m");
        let notification = Notification::new(alert.id, Channel::Console, "ops@example.test", "subject", "body", 3);
        assert!(channel.send(&notification, &alert).await);
    }

    #[tokio::test]
    async fn file_channel_appends_a_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(dir.path());
        let alert = Alert::new(crate::contracts::AlertType::Custom, AlertPriority::Low, "t", "m");
        let notification = Notification::new(alert.id, Channel::File, "ops@example.test", "subject", "body", 3);
        assert!(channel.send(&notification, &alert).await);
        assert!(channel.send(&notification, &alert).await);
        let path = dir.path().join(format!("notifications_{}.log", Utc::now().format("%Y%m%d")));
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn webhook_channel_requires_a_nonempty_url() {
        let mut config = WebhookChannelSection::default();
        config.webhook_url.clear();
        let channel = WebhookChannel::new(Client::new(), config);
        assert!(!channel.validate_config());
    }
}
