//! Outbound notification delivery — SMTP via lettre.
//!
//! Every call site treats delivery as best-effort: a failed send is
//! logged and never rolls back persisted reconciliation results.

use std::path::Path;

use async_trait::async_trait;
use lettre::message::{Attachment, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::error::NotifyError;

/// Delivery collaborator for approver-facing mail.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message, optionally attaching a file from disk.
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError>;
}

/// SMTP configuration for the notifier, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (notifications disabled).
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;

        let smtp_port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

/// SMTP notifier over a STARTTLS relay.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<Message, NotifyError> {
        let builder = Message::builder()
            .from(self.config.from_address.parse().map_err(|e| {
                NotifyError::Build(format!("Invalid from address: {e}"))
            })?)
            .to(recipient
                .parse()
                .map_err(|e| NotifyError::Build(format!("Invalid recipient: {e}")))?)
            .subject(subject);

        // Attach the referenced file when it is still on disk; a vanished
        // file downgrades to a body-only message rather than failing.
        let attachment_part = attachment.filter(|p| p.exists()).and_then(|path| {
            let bytes = std::fs::read(path).ok()?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".into());
            Some(Attachment::new(filename).body(bytes, ContentType::parse("application/octet-stream").ok()?))
        });

        match attachment_part {
            Some(part) => builder
                .multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(body.to_string()))
                        .singlepart(part),
                )
                .map_err(|e| NotifyError::Build(e.to_string())),
            None => builder
                .body(body.to_string())
                .map_err(|e| NotifyError::Build(e.to_string())),
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
        attachment: Option<&Path>,
    ) -> Result<(), NotifyError> {
        let message = self.build_message(recipient, subject, body, attachment)?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        let transport = SmtpTransport::starttls_relay(&self.config.smtp_host)
            .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        transport
            .send(&message)
            .map_err(|e| NotifyError::Transport(format!("SMTP send failed: {e}")))?;

        tracing::info!(recipient, subject, "Notification sent");
        Ok(())
    }
}
