pub mod email;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::backup::BackupResult;
use crate::config::MailServer;
use crate::error::MailError;
use crate::logger::Logger;
use email::{compose, Mailer, SmtpMailer};

/// Reports the outcome of an attempt. Fire-and-forget: implementations log
/// their own failures and never hand them back to the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, result: &BackupResult);
}

pub struct MailNotifier {
    server: MailServer,
    mailer: Arc<dyn Mailer>,
    log: Logger,
}

impl MailNotifier {
    pub fn new(server: MailServer, mailer: Arc<dyn Mailer>, log: Logger) -> Self {
        MailNotifier {
            server,
            mailer,
            log,
        }
    }

    pub fn smtp(server: MailServer, log: Logger) -> Self {
        let mailer = Arc::new(SmtpMailer::new(server.clone()));
        Self::new(server, mailer, log)
    }

    async fn deliver(&self, result: &BackupResult) -> Result<(), MailError> {
        let email = compose(&self.server.user, &self.server.to, result, Utc::now())?;
        self.mailer.send(email).await
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn notify(&self, result: &BackupResult) {
        match self.deliver(result).await {
            Ok(()) => self
                .log
                .info(format!("Email sent successfully to {}", self.server.to)),
            Err(err) => self.log.error(format!("Failed to send email: {err}")),
        }
    }
}
