use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use backup_mailer::backup::{dump::MysqlDump, BackupExecutor};
use backup_mailer::config::{CliArgs, EnvConfig};
use backup_mailer::cron::Schedule;
use backup_mailer::logger::{self, Concern, Logger};
use backup_mailer::mail::MailNotifier;
use backup_mailer::scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();

    let args = CliArgs::parse();

    let config = Arc::new(EnvConfig::from_env().context("could not load configuration")?);

    // Dropping the guards at the end of main flushes the log files.
    let _guards = logger::init(
        &args.log_dir,
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "backup_mailer=warn".into())),
    )
    .with_context(|| format!("could not open log directory {}", args.log_dir.display()))?;

    let backup_log = Logger::new(Concern::Backup);
    let mail_log = Logger::new(Concern::Mail);

    let tool = MysqlDump::new(config.dump_command.clone()).timeout(config.dump_timeout);
    let executor = BackupExecutor::new(config.clone(), Arc::new(tool), backup_log.clone());
    let notifier = MailNotifier::smtp(config.mail.clone(), mail_log);
    let scheduler = Scheduler::new(executor, Arc::new(notifier), backup_log.clone());

    if args.now {
        scheduler.run_once().await;
        return Ok(ExitCode::SUCCESS);
    }

    backup_log.info("BackupMailer started");
    backup_log.info(format!("Cron schedule: {}", config.cron_schedule));
    backup_log.info(format!("Backup path:   {}", config.backup_path.display()));
    backup_log.info(format!(
        "Database:      {}@{}:{}",
        config.db.database, config.db.host, config.db.port
    ));

    let schedule = match Schedule::parse(&config.cron_schedule) {
        Ok(schedule) => schedule,
        Err(err) => {
            backup_log.error(err.to_string());
            return Ok(ExitCode::FAILURE);
        }
    };

    tokio::select! {
        res = scheduler.start(schedule) => {
            if let Err(err) = res {
                backup_log.error(err.to_string());
                return Ok(ExitCode::FAILURE);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            let _idle = scheduler.shut_down().await;
            backup_log.info("Interrupted, shutting down");
        }
    }

    Ok(ExitCode::SUCCESS)
}
