//! Drives the backup pipeline: dump, then notify, then log the next run.

use chrono::{DateTime, Local, SecondsFormat};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::backup::{BackupExecutor, BackupResult};
use crate::cron::Schedule;
use crate::error::ScheduleError;
use crate::logger::Logger;
use crate::mail::Notifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(BackupResult),
    /// Another run still held the pipeline.
    Skipped,
}

#[derive(Clone)]
pub struct Scheduler {
    executor: Arc<BackupExecutor>,
    notifier: Arc<dyn Notifier>,
    log: Logger,
    running: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(executor: BackupExecutor, notifier: Arc<dyn Notifier>, log: Logger) -> Self {
        Scheduler {
            executor: Arc::new(executor),
            notifier,
            log,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// One pass of the pipeline. At most one pass runs at a time; a call made
    /// while another is in flight returns `Skipped` without touching anything.
    pub async fn trigger(&self) -> RunOutcome {
        self.pipeline(None).await
    }

    async fn pipeline(&self, announce: Option<&str>) -> RunOutcome {
        let Ok(_running) = self.running.clone().try_lock_owned() else {
            self.log
                .warn("Previous backup is still running -- skipping this run");
            return RunOutcome::Skipped;
        };
        if let Some(line) = announce {
            self.log.info(line);
        }

        let result = self.executor.run().await;
        self.notifier.notify(&result).await;
        RunOutcome::Completed(result)
    }

    /// Manual trigger: a single synchronous pass.
    pub async fn run_once(&self) -> RunOutcome {
        self.log.info("Manual backup triggered (backup-now)");
        let outcome = self.trigger().await;
        self.log.info("Done");
        outcome
    }

    /// Waits for an in-flight pass to finish. While the returned guard is
    /// held every further trigger is skipped.
    pub async fn shut_down(&self) -> OwnedMutexGuard<()> {
        self.running.clone().lock_owned().await
    }

    /// Fires the pipeline at every instant matched by `schedule`, in local
    /// time. Only returns if the schedule runs out of future instants.
    pub async fn start(&self, schedule: Schedule) -> Result<(), ScheduleError> {
        let mut next = schedule.next_run()?;
        self.log
            .info(format!("Cron job registered. Next run: {}", iso(&next)));

        loop {
            sleep_until(next).await;

            let this = self.clone();
            let fired = schedule.clone();
            tokio::spawn(async move { this.fire(&fired).await });

            next = schedule.next_run()?;
        }
    }

    async fn fire(&self, schedule: &Schedule) {
        let outcome = self
            .pipeline(Some("Cron triggered -- starting backup job"))
            .await;
        if let RunOutcome::Completed(_) = outcome {
            match schedule.next_run() {
                Ok(next) => self
                    .log
                    .info(format!("Next scheduled run: {}", iso(&next))),
                Err(err) => self.log.warn(err.to_string()),
            }
        }
    }
}

async fn sleep_until(at: DateTime<Local>) {
    // Re-check after waking: the wall clock may have moved while we slept.
    while let Ok(left) = (at - Local::now()).to_std() {
        if left.is_zero() {
            break;
        }
        tokio::time::sleep(left.min(Duration::from_secs(60))).await;
    }
}

fn iso(at: &DateTime<Local>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}
