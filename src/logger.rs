//! Operator-facing audit log on top of `tracing`.
//!
//! Each concern (backup runs, mail delivery) logs under its own target.
//! The subscriber built by [`init`] writes those events as
//! `[<ISO timestamp>] [<LEVEL>] <message>` lines to `<dir>/backup.log` or
//! `<dir>/mail.log`, and mirrors them to stdout (INFO, WARN) or stderr
//! (ERROR). Everything else goes through the usual `RUST_LOG` filtered
//! diagnostics layer.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::path::Path;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

pub const BACKUP_TARGET: &str = "backup";
pub const MAIL_TARGET: &str = "mail";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concern {
    Backup,
    Mail,
}

impl Concern {
    pub fn target(self) -> &'static str {
        match self {
            Concern::Backup => BACKUP_TARGET,
            Concern::Mail => MAIL_TARGET,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Concern::Backup => "backup.log",
            Concern::Mail => "mail.log",
        }
    }
}

// Targets and levels of tracing callsites must be constants.
macro_rules! audit {
    ($concern:expr, $level:ident, $msg:expr) => {
        match $concern {
            Concern::Backup => tracing::$level!(target: BACKUP_TARGET, "{}", $msg),
            Concern::Mail => tracing::$level!(target: MAIL_TARGET, "{}", $msg),
        }
    };
}

/// Handle passed to each component; records land in that concern's file.
#[derive(Debug, Clone)]
pub struct Logger {
    concern: Concern,
}

impl Logger {
    pub fn new(concern: Concern) -> Self {
        Logger { concern }
    }

    pub fn concern(&self) -> Concern {
        self.concern
    }

    pub fn info(&self, message: impl AsRef<str>) {
        audit!(self.concern, info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        audit!(self.concern, warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        audit!(self.concern, error, message.as_ref());
    }
}

/// `[<ISO timestamp>] [<LEVEL>] <message>`
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "{}", line_prefix(Utc::now(), *event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub fn line_prefix(at: DateTime<Utc>, level: Level) -> String {
    format!(
        "[{}] [{}] ",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        level
    )
}

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Audit lines for one concern, written through `make_writer`.
pub fn audit_layer<W>(concern: Concern, make_writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .event_format(LineFormat)
        .with_writer(make_writer)
        .with_ansi(false)
        .with_filter(Targets::new().with_target(concern.target(), Level::INFO))
        .boxed()
}

fn console_layer() -> BoxedLayer {
    let targets = Targets::new()
        .with_target(BACKUP_TARGET, Level::INFO)
        .with_target(MAIL_TARGET, Level::INFO);
    tracing_subscriber::fmt::layer()
        .event_format(LineFormat)
        .with_writer(std::io::stderr.with_max_level(Level::ERROR).or_else(std::io::stdout))
        .with_filter(targets)
        .boxed()
}

/// Keeps the background file writers alive; dropping it flushes them.
#[must_use]
pub struct LogGuards(Vec<WorkerGuard>);

/// One non-blocking, never-rotated file per concern under `dir`.
pub fn file_layers(dir: &Path) -> Result<(Vec<BoxedLayer>, LogGuards), InitError> {
    let mut layers = Vec::new();
    let mut guards = Vec::new();
    for concern in [Concern::Backup, Concern::Mail] {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(concern.file_name())
            .build(dir)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(audit_layer(concern, writer));
        guards.push(guard);
    }
    Ok((layers, LogGuards(guards)))
}

/// Installs the global subscriber: audit files, audit console, diagnostics.
pub fn init(dir: &Path, diagnostics: EnvFilter) -> Result<LogGuards, InitError> {
    let (mut layers, guards) = file_layers(dir)?;
    layers.push(console_layer());
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(diagnostics)
            .boxed(),
    );
    tracing_subscriber::registry().with(layers).init();
    Ok(guards)
}
