//! The external dump program, behind a narrow trait so the executor can be
//! driven by a fake in tests.

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::DbConnection;

/// Everything the executor needs from a finished dump process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl DumpOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[async_trait]
pub trait DumpTool: Send + Sync {
    /// Name used in error messages, e.g. `mysqldump`.
    fn name(&self) -> &str;

    /// Runs the tool to completion. `Err` means the process never ran.
    async fn execute(&self, args: &[String]) -> io::Result<DumpOutput>;
}

/// `mysqldump` (or a compatible program) spawned as a child process.
#[derive(Debug, Clone)]
pub struct MysqlDump {
    program: String,
    timeout: Option<Duration>,
}

impl MysqlDump {
    pub fn new(program: impl Into<String>) -> Self {
        MysqlDump {
            program: program.into(),
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl DumpTool for MysqlDump {
    fn name(&self) -> &str {
        &self.program
    }

    async fn execute(&self, args: &[String]) -> io::Result<DumpOutput> {
        tracing::debug!("spawning {} with {} args", self.program, args.len());

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("{} timed out after {}s", self.program, limit.as_secs()),
                    )
                })??,
            None => child.wait_with_output().await?,
        };

        tracing::debug!("{} finished with {:?}", self.program, output.status.code());

        Ok(DumpOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// `--skip-ssl -h <host> -P <port> -u <user> -p<password> <database>`
pub fn dump_args(db: &DbConnection) -> Vec<String> {
    vec![
        "--skip-ssl".to_string(),
        "-h".to_string(),
        db.host.clone(),
        "-P".to_string(),
        db.port.to_string(),
        "-u".to_string(),
        db.user.clone(),
        format!("-p{}", db.password),
        db.database.clone(),
    ]
}
