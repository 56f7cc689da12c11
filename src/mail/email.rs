//! Building and sending the report email

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use lettre::{
    message,
    transport::smtp::authentication::Credentials,
    transport::smtp::client::{Tls, TlsParameters},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::backup::BackupResult;
use crate::config::MailServer;
use crate::error::MailError;

const IMPLICIT_TLS_PORT: u16 = 465;

/// Opaque "send this message" capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Message) -> Result<(), MailError>;
}

/// Connects to the configured SMTP relay for every message.
pub struct SmtpMailer {
    server: MailServer,
}

impl SmtpMailer {
    pub fn new(server: MailServer) -> Self {
        SmtpMailer { server }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: Message) -> Result<(), MailError> {
        let mailer = smtp_transport(&self.server)?;
        tracing::debug!("sending report via {}:{}", self.server.host, self.server.port);
        mailer.send(email).await?;
        Ok(())
    }
}

/// Port 465 speaks TLS from the first byte. On any other port the session
/// upgrades with STARTTLS when the server offers it and stays plain otherwise.
pub fn smtp_transport(
    server: &MailServer,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, lettre::transport::smtp::Error> {
    let smtp_credentials = Credentials::new(server.user.clone(), server.pass.clone());

    let builder = if server.port == IMPLICIT_TLS_PORT {
        AsyncSmtpTransport::<Tokio1Executor>::relay(server.host.as_str())?
    } else {
        let tls = TlsParameters::new(server.host.clone())?;
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(server.host.as_str())
            .tls(Tls::Opportunistic(tls))
    };

    Ok(builder
        .port(server.port)
        .credentials(smtp_credentials)
        .build())
}

pub fn subject(result: &BackupResult) -> String {
    match result {
        BackupResult::Success { filename } => {
            format!("[BackupMailer] Backup successful: {filename}")
        }
        BackupResult::Failure { .. } => "[BackupMailer] Backup FAILED".to_string(),
    }
}

/// Plain-text report. `reported_at` is when the mail is written, not when
/// the dump ran.
pub fn body(result: &BackupResult, reported_at: DateTime<Utc>) -> String {
    let timestamp = reported_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let rule = "─".repeat(40);

    let (status, detail, closing) = match result {
        BackupResult::Success { filename } => (
            "SUCCESS",
            format!("File:      {filename}"),
            "The database backup completed successfully.",
        ),
        BackupResult::Failure { error } => (
            "FAILED",
            format!("Error:     {error}"),
            "The database backup failed. Please check the server logs.",
        ),
    };

    [
        "BackupMailer -- Backup Report".to_string(),
        rule,
        format!("Status:    {status}"),
        detail,
        format!("Timestamp: {timestamp}"),
        String::new(),
        closing.to_string(),
    ]
    .join("\n")
}

pub fn compose(
    from: &str,
    to: &str,
    result: &BackupResult,
    reported_at: DateTime<Utc>,
) -> Result<Message, MailError> {
    let email = Message::builder()
        .from(from.parse()?)
        .to(to.parse()?)
        .subject(subject(result))
        .header(message::header::ContentType::TEXT_PLAIN)
        .body(body(result, reported_at))?;

    Ok(email)
}
