use thiserror::Error;

/// Startup errors raised while reading the environment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables:\n  {}", .0.join("\n  "))]
    Missing(Vec<String>),
    #[error("Invalid DATABASE_URL `{url}`: {reason}")]
    InvalidDatabaseUrl { url: String, reason: String },
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// The cron expression could not be turned into a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid cron expression: \"{expr}\" ({reason})")]
    Invalid { expr: String, reason: String },
    #[error("Cron expression \"{0}\" has no upcoming run")]
    NoUpcomingRun(String),
}

/// Anything that stops a report email from going out. Never leaves the notifier.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error(transparent)]
    Smtp(#[from] lettre::transport::smtp::Error),
}
