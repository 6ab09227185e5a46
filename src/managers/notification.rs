//! Notification dispatch for finished backup jobs
//!
//! Each configured target is a [`Notifier`]: Discord webhooks post an embed,
//! email targets send a plain-text message over SMTP. The dispatcher filters
//! targets on `notify_on_success` / `notify_on_fail`, tries every one of
//! them, and folds all failures into a single notification error.

use crate::config::{NotificationMethod, NotificationTarget, ResolvedNotification, SmtpSecurity};
use crate::error::{BackupError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error text placed in a message body
const MAX_ERROR_LEN: usize = 500;

/// Outcome of one job, as reported to notification targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub job_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub database: String,
    pub host: String,
    pub protocol: String,
    pub compressed: bool,
    pub encrypted: bool,
    pub duration_secs: u64,
}

impl BackupReport {
    /// One-line summary, used as title and mail subject
    pub fn status_line(&self) -> String {
        if self.success {
            format!("Backup '{}' succeeded", self.job_id)
        } else {
            format!("Backup '{}' failed", self.job_id)
        }
    }

    /// Plain-text body with the job metadata
    pub fn details(&self) -> String {
        let mut lines = vec![
            self.status_line(),
            String::new(),
            format!("Database:   {}", self.database),
            format!("Host:       {}", self.host),
            format!("Protocol:   {}", self.protocol),
            format!("Compressed: {}", yes_no(self.compressed)),
            format!("Encrypted:  {}", yes_no(self.encrypted)),
            format!("Duration:   {}", format_duration(self.duration_secs)),
        ];
        if let Some(error) = &self.error {
            lines.push(String::new());
            lines.push(format!("Error: {}", truncate(error, MAX_ERROR_LEN)));
        }
        lines.join("\n")
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

/// One notification channel
#[async_trait]
pub trait Notifier: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self);

    async fn send_message(&mut self, report: &BackupReport) -> Result<()>;
}

/// Discord embed color codes (decimal)
#[derive(Debug, Clone, Copy)]
pub enum NotificationColor {
    /// Red - for failures
    Failure = 15158332, // #E74C3C
    /// Green - for success
    Success = 3066993, // #2ECC71
}

impl NotificationColor {
    fn as_decimal(&self) -> u32 {
        *self as u32
    }
}

/// Discord webhook payload
#[derive(Debug, Serialize)]
struct DiscordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
}

/// Posts an embed to a Discord webhook
pub struct DiscordNotifier {
    name: String,
    webhook_url: String,
    client: Option<reqwest::Client>,
}

impl DiscordNotifier {
    pub fn new(name: &str, webhook_url: &str) -> Self {
        Self {
            name: name.to_string(),
            webhook_url: webhook_url.to_string(),
            client: None,
        }
    }

    fn build_payload(report: &BackupReport) -> DiscordPayload {
        let (color, emoji) = if report.success {
            (NotificationColor::Success, "\u{2705}") // Green check
        } else {
            (NotificationColor::Failure, "\u{274C}") // Red X
        };

        let mut fields = vec![
            DiscordField {
                name: "Database".to_string(),
                value: report.database.clone(),
                inline: true,
            },
            DiscordField {
                name: "Destination".to_string(),
                value: format!("{} ({})", report.host, report.protocol),
                inline: true,
            },
            DiscordField {
                name: "Duration".to_string(),
                value: format_duration(report.duration_secs),
                inline: true,
            },
            DiscordField {
                name: "Compressed".to_string(),
                value: yes_no(report.compressed).to_string(),
                inline: true,
            },
            DiscordField {
                name: "Encrypted".to_string(),
                value: yes_no(report.encrypted).to_string(),
                inline: true,
            },
        ];

        if let Some(ref error) = report.error {
            fields.push(DiscordField {
                name: "Error".to_string(),
                value: format!("```\n{}\n```", truncate(error, MAX_ERROR_LEN)),
                inline: false,
            });
        }

        let embed = DiscordEmbed {
            title: format!("{} Dump Manager: {}", emoji, report.job_id),
            description: Some(report.status_line()),
            color: color.as_decimal(),
            fields,
            footer: Some(DiscordFooter {
                text: "dump-manager".to_string(),
            }),
            timestamp: Some(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        };

        DiscordPayload {
            username: Some("Dump Manager".to_string()),
            embeds: vec![embed],
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn connect(&mut self) -> Result<()> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackupError::Notification(format!("{}: cannot create HTTP client: {}", self.name, e)))?;
        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.client = None;
    }

    async fn send_message(&mut self, report: &BackupReport) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| BackupError::Notification(format!("{}: not connected", self.name)))?;

        let response = client
            .post(&self.webhook_url)
            .json(&Self::build_payload(report))
            .send()
            .await
            // The webhook URL carries its token
            .map_err(|e| BackupError::Notification(format!("{}: request failed: {}", self.name, e.without_url())))?;

        let status = response.status();
        if status.is_success() {
            debug!("Discord webhook '{}' accepted the message", self.name);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            error!("Discord webhook '{}' failed with status {}: {}", self.name, status, body);
            Err(BackupError::Notification(format!(
                "{}: webhook returned status {}",
                self.name, status
            )))
        }
    }
}

/// Sends a plain-text mail over SMTP
pub struct EmailNotifier {
    name: String,
    target: NotificationTarget,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailNotifier {
    pub fn new(name: &str, target: &NotificationTarget) -> Self {
        Self {
            name: name.to_string(),
            target: target.clone(),
            transport: None,
        }
    }

    fn error(&self, what: &str, reason: impl std::fmt::Display) -> BackupError {
        BackupError::Notification(format!("{}: {}: {}", self.name, what, reason))
    }

    fn build_message(&self, report: &BackupReport) -> Result<Message> {
        let sender = self.target.sender.as_deref().unwrap_or_default();
        let from: Mailbox = sender
            .parse()
            .map_err(|e| self.error("invalid sender address", e))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(report.status_line())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.target.recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| self.error("invalid recipient address", e))?;
            builder = builder.to(to);
        }

        builder
            .body(report.details())
            .map_err(|e| self.error("cannot build message", e))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn connect(&mut self) -> Result<()> {
        let server = self
            .target
            .smtp_server
            .clone()
            .ok_or_else(|| self.error("configuration", "smtp_server missing"))?;

        let builder = match self.target.smtp_security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&server)
                .map_err(|e| self.error("TLS setup failed", e))?,
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server)
                .map_err(|e| self.error("STARTTLS setup failed", e))?,
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&server),
        };

        let mut builder = builder
            .port(self.target.smtp_port)
            .timeout(Some(REQUEST_TIMEOUT));
        if let (Some(user), Some(password)) = (&self.target.smtp_user, &self.target.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.expose().to_string()));
        }

        let transport = builder.build();
        let reachable = transport
            .test_connection()
            .await
            .map_err(|e| self.error("SMTP connection failed", e))?;
        if !reachable {
            return Err(self.error("SMTP connection failed", format!("{} did not respond", server)));
        }

        self.transport = Some(transport);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.transport = None;
    }

    async fn send_message(&mut self, report: &BackupReport) -> Result<()> {
        let message = self.build_message(report)?;
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| self.error("send", "not connected"))?;

        transport
            .send(message)
            .await
            .map_err(|e| self.error("send failed", e))?;
        debug!("Mail sent via '{}'", self.name);
        Ok(())
    }
}

/// Build the notifier for a configured target
pub fn create_notifier(notification: &ResolvedNotification) -> Box<dyn Notifier> {
    let target = &notification.target;
    match target.method {
        NotificationMethod::Discord => Box::new(DiscordNotifier::new(
            &notification.name,
            target.webhook_url.as_deref().unwrap_or_default(),
        )),
        NotificationMethod::Email => Box::new(EmailNotifier::new(&notification.name, target)),
    }
}

/// Whether a target wants to hear about this outcome
pub fn wants(target: &NotificationTarget, success: bool) -> bool {
    if success {
        target.notify_on_success
    } else {
        target.notify_on_fail
    }
}

/// Receives the report of every finished job
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, targets: &[ResolvedNotification], report: &BackupReport) -> Result<()>;
}

/// Sends reports through real Discord/email notifiers
#[derive(Debug, Clone, Default)]
pub struct NotificationDispatcher;

#[async_trait]
impl NotificationSink for NotificationDispatcher {
    async fn notify(&self, targets: &[ResolvedNotification], report: &BackupReport) -> Result<()> {
        let mut failures = Vec::new();

        for notification in targets.iter().filter(|n| wants(&n.target, report.success)) {
            let mut notifier = create_notifier(notification);

            let result = match notifier.connect().await {
                Ok(()) => notifier.send_message(report).await,
                Err(e) => Err(e),
            };
            notifier.disconnect().await;

            match result {
                Ok(()) => info!("[{}] Notification sent to '{}'", report.job_id, notification.name),
                Err(e) => {
                    error!("[{}] {}", report.job_id, e);
                    failures.push(e.to_string());
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BackupError::Notification(failures.join("; ")))
        }
    }
}

/// Format duration in human-readable form
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        let secs = seconds % 60;
        if secs == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, secs)
        }
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}

/// Mock sink for testing
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct MockNotifier {
        /// (target names that wanted the report, report)
        pub reports: Arc<Mutex<Vec<(Vec<String>, BackupReport)>>>,
        failure: Arc<Mutex<Option<String>>>,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every dispatch fail with `message`
        pub fn with_failure(self, message: &str) -> Self {
            *self.failure.lock().unwrap() = Some(message.to_string());
            self
        }

        pub fn get_reports(&self) -> Vec<BackupReport> {
            self.reports
                .lock()
                .unwrap()
                .iter()
                .map(|(_, report)| report.clone())
                .collect()
        }

        pub fn last_report(&self) -> Option<BackupReport> {
            self.get_reports().pop()
        }
    }

    #[async_trait]
    impl NotificationSink for MockNotifier {
        async fn notify(&self, targets: &[ResolvedNotification], report: &BackupReport) -> Result<()> {
            let names = targets
                .iter()
                .filter(|n| wants(&n.target, report.success))
                .map(|n| n.name.clone())
                .collect();
            self.reports.lock().unwrap().push((names, report.clone()));

            match self.failure.lock().unwrap().clone() {
                Some(message) => Err(BackupError::Notification(message)),
                None => Ok(()),
            }
        }
    }
}
