//! One backup attempt: dump the database and publish the file.

pub mod dump;

use chrono::{DateTime, Local, TimeZone};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::config::EnvConfig;
use crate::logger::Logger;
use dump::{dump_args, DumpTool};

/// Outcome of a single attempt, handed to the notifier exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupResult {
    Success { filename: String },
    Failure { error: String },
}

impl BackupResult {
    pub fn is_success(&self) -> bool {
        matches!(self, BackupResult::Success { .. })
    }
}

pub struct BackupExecutor {
    config: Arc<EnvConfig>,
    tool: Arc<dyn DumpTool>,
    log: Logger,
}

impl BackupExecutor {
    pub fn new(config: Arc<EnvConfig>, tool: Arc<dyn DumpTool>, log: Logger) -> Self {
        BackupExecutor { config, tool, log }
    }

    pub async fn run(&self) -> BackupResult {
        self.run_at(Local::now()).await
    }

    /// Runs an attempt whose file name is derived from `now`.
    pub async fn run_at(&self, now: DateTime<Local>) -> BackupResult {
        let dir = &self.config.backup_path;
        match ensure_directory(dir).await {
            Ok(true) => self
                .log
                .info(format!("Created backup directory: {}", dir.display())),
            Ok(false) => {}
            Err(err) => {
                return self.error(format!(
                    "could not create backup directory {}: {}",
                    dir.display(),
                    err
                ))
            }
        }

        let filename = backup_filename(&now);
        let output_path = dir.join(&filename);
        let db = &self.config.db;

        self.log.info(format!(
            "Starting backup of database \"{}\" on {}:{}...",
            db.database, db.host, db.port
        ));

        let output = match self.tool.execute(&dump_args(db)).await {
            Ok(output) => output,
            Err(err) => return self.error(err.to_string()),
        };

        if !output.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let error = match (stderr.trim(), output.exit_code) {
                ("", Some(code)) => format!("{} exited with code {}", self.tool.name(), code),
                ("", None) => format!("{} was terminated by a signal", self.tool.name()),
                (msg, _) => msg.to_string(),
            };
            self.log.error(format!("Backup failed: {error}"));
            return BackupResult::Failure { error };
        }

        if let Err(err) = write_atomically(&output_path, &output.stdout).await {
            return self.error(format!("could not write {}: {}", output_path.display(), err));
        }

        self.log
            .info(format!("Backup saved to {}", output_path.display()));
        BackupResult::Success { filename }
    }

    fn error(&self, error: String) -> BackupResult {
        self.log.error(format!("Backup error: {error}"));
        BackupResult::Failure { error }
    }
}

/// `backup_YYYY-MM-DD_HH-mm-ss.sql`
pub fn backup_filename<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    format!("backup_{}.sql", at.format("%Y-%m-%d_%H-%M-%S"))
}

/// Creates `dir` and its parents. Returns whether anything was created.
pub async fn ensure_directory(dir: &Path) -> io::Result<bool> {
    if tokio::fs::try_exists(dir).await? {
        return Ok(false);
    }
    tokio::fs::create_dir_all(dir).await?;
    Ok(true)
}

// Readers of the backup directory only ever see complete dumps.
async fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");

    let published = match tokio::fs::write(&partial, bytes).await {
        Ok(()) => tokio::fs::rename(&partial, path).await,
        Err(err) => Err(err),
    };
    if published.is_err() {
        let _ = tokio::fs::remove_file(&partial).await;
    }
    published
}

#[cfg(test)]
pub(crate) mod testing {
    use super::dump::{DumpOutput, DumpTool};
    use crate::config::{DbConnection, EnvConfig, MailServer};
    use async_trait::async_trait;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub fn test_config(backup_path: PathBuf) -> EnvConfig {
        EnvConfig {
            backup_path,
            cron_schedule: "0 3 * * *".into(),
            db: DbConnection {
                host: "db".into(),
                port: 3306,
                user: "root".into(),
                password: "pw".into(),
                database: "shop".into(),
            },
            mail: MailServer {
                host: "smtp.example.com".into(),
                port: 587,
                user: "backup@example.com".into(),
                pass: "pw".into(),
                to: "ops@example.com".into(),
            },
            dump_command: "mysqldump".into(),
            dump_timeout: None,
        }
    }

    /// Scripted stand-in for `mysqldump`.
    pub struct FakeDump {
        pub result: Result<DumpOutput, io::ErrorKind>,
        pub delay: Duration,
        pub calls: AtomicUsize,
    }

    impl FakeDump {
        pub fn exits(code: i32, stdout: &[u8], stderr: &[u8]) -> Self {
            FakeDump {
                result: Ok(DumpOutput {
                    exit_code: Some(code),
                    stdout: stdout.to_vec(),
                    stderr: stderr.to_vec(),
                }),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn fails_to_spawn(kind: io::ErrorKind) -> Self {
            FakeDump {
                result: Err(kind),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DumpTool for FakeDump {
        fn name(&self) -> &str {
            "mysqldump"
        }

        async fn execute(&self, _args: &[String]) -> io::Result<DumpOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.result {
                Ok(out) => Ok(out.clone()),
                Err(kind) => Err(io::Error::new(*kind, "mysqldump: command not found")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{test_config, FakeDump};
    use super::*;
    use crate::logger::testing::capture;
    use crate::logger::Concern;

    fn fixed_instant() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 9, 7, 3).unwrap()
    }

    fn executor(dir: &Path, tool: FakeDump) -> (BackupExecutor, Arc<FakeDump>) {
        let tool = Arc::new(tool);
        let exec = BackupExecutor::new(
            Arc::new(test_config(dir.join("backups"))),
            tool.clone(),
            Logger::new(Concern::Backup),
        );
        (exec, tool)
    }

    #[test]
    fn filename_is_zero_padded_local_time() {
        assert_eq!(
            backup_filename(&fixed_instant()),
            "backup_2024-03-05_09-07-03.sql"
        );
    }

    #[tokio::test]
    async fn directory_creation_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a/b/c");
        assert!(ensure_directory(&dir).await.unwrap());
        assert!(!ensure_directory(&dir).await.unwrap());
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn successful_dump_writes_stdout_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let bytes = b"-- MySQL dump\nINSERT INTO t VALUES (1);\n\xff\x00";
        let (exec, tool) = executor(tmp.path(), FakeDump::exits(0, bytes, b"warning: ignored"));

        let result = exec.run_at(fixed_instant()).await;

        assert_eq!(
            result,
            BackupResult::Success {
                filename: "backup_2024-03-05_09-07-03.sql".into()
            }
        );
        assert_eq!(tool.calls(), 1);
        let path = tmp.path().join("backups/backup_2024-03-05_09-07-03.sql");
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
        assert!(!tmp
            .path()
            .join("backups/backup_2024-03-05_09-07-03.sql.partial")
            .exists());
    }

    #[tokio::test]
    async fn existing_file_is_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let (exec, _) = executor(tmp.path(), FakeDump::exits(0, b"new", b""));
        let path = tmp.path().join("backups/backup_2024-03-05_09-07-03.sql");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"old contents that are longer").unwrap();

        assert!(exec.run_at(fixed_instant()).await.is_success());
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn non_zero_exit_without_stderr_reports_code() {
        let tmp = tempfile::tempdir().unwrap();
        let (exec, _) = executor(tmp.path(), FakeDump::exits(2, b"partial", b""));

        let result = exec.run_at(fixed_instant()).await;

        assert_eq!(
            result,
            BackupResult::Failure {
                error: "mysqldump exited with code 2".into()
            }
        );
        let entries = std::fs::read_dir(tmp.path().join("backups")).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn non_zero_exit_reports_trimmed_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let captured = capture();
        let stderr = b"\nmysqldump: Got error: 1045: Access denied for user 'root'\n  ";
        let (exec, _) = executor(tmp.path(), FakeDump::exits(2, b"", stderr));

        let result = exec.run_at(fixed_instant()).await;

        assert_eq!(
            result,
            BackupResult::Failure {
                error: "mysqldump: Got error: 1045: Access denied for user 'root'".into()
            }
        );
        let log = captured.text(Concern::Backup);
        assert!(log.contains("[ERROR] Backup failed: mysqldump: Got error: 1045"));
    }

    #[tokio::test]
    async fn spawn_failure_becomes_a_failure_result() {
        let tmp = tempfile::tempdir().unwrap();
        let captured = capture();
        let (exec, _) = executor(tmp.path(), FakeDump::fails_to_spawn(io::ErrorKind::NotFound));

        let result = exec.run().await;

        assert_eq!(
            result,
            BackupResult::Failure {
                error: "mysqldump: command not found".into()
            }
        );
        let log = captured.text(Concern::Backup);
        assert!(log.contains("[INFO] Created backup directory:"));
        assert!(log.contains("[ERROR] Backup error: mysqldump: command not found"));
    }

    #[tokio::test]
    async fn failed_rename_leaves_no_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (exec, _) = executor(tmp.path(), FakeDump::exits(0, b"dump", b""));
        let blocked = tmp.path().join("backups/backup_2024-03-05_09-07-03.sql");
        std::fs::create_dir_all(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), b"x").unwrap();

        let result = exec.run_at(fixed_instant()).await;

        assert!(matches!(result, BackupResult::Failure { .. }));
        let mut entries: Vec<String> = std::fs::read_dir(tmp.path().join("backups"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["backup_2024-03-05_09-07-03.sql".to_string()]);
    }
}
