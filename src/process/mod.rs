//! Subprocess execution for build tooling and version control.

mod git;
mod toolchain;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

pub use git::clone_repository;
pub use toolchain::{COMPOSER_MANIFEST, NPM_LOCKFILE, NPM_MANIFEST, run_build_steps};

/// Default upper bound for a single subprocess.
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 900;

/// How long output is still collected once the child itself has exited or
/// been killed. Grandchildren that inherited the pipes can keep them open
/// far longer.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// What a finished (or abandoned) subprocess left behind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code; `None` if killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs external commands in a given working directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `command` in `working_dir` and captures its output. Errors only
    /// when the process could not be started; a non-zero exit is reported in
    /// the output.
    async fn run(&self, command: &CommandSpec, working_dir: &Path) -> Result<CommandOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    timeout: Option<Duration>,
}

impl Default for SystemProcessRunner {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(DEFAULT_PROCESS_TIMEOUT_SECS)))
    }
}

impl SystemProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    #[tracing::instrument(skip(self))]
    async fn run(&self, command: &CommandSpec, working_dir: &Path) -> Result<CommandOutput> {
        debug!("Running `{}` in {:?}", command, working_dir);

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start `{}`", command))?;

        let stdout = child.stdout.take().context("Failed to capture stdout")?;
        let stderr = child.stderr.take().context("Failed to capture stderr")?;
        let stdout_capture = OutputCapture::spawn(stdout);
        let stderr_capture = OutputCapture::spawn(stderr);

        let (exit_code, timed_out) = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => (status?.code(), false),
                Err(_) => {
                    debug!("`{}` exceeded {:?}, killing it", command, limit);
                    let _ = child.kill().await;
                    (None, true)
                }
            },
            None => (child.wait().await?.code(), false),
        };

        let stdout = stdout_capture.finish(OUTPUT_DRAIN_GRACE).await;
        let stderr = stderr_capture.finish(OUTPUT_DRAIN_GRACE).await;

        for line in stdout.lines().chain(stderr.lines()) {
            debug!("[{}] {}", command.program, line);
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }
}

/// Reads a child's pipe in the background into a shared buffer, so whatever
/// arrived can be taken even if the pipe never reaches EOF.
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl OutputCapture {
    fn spawn<S>(mut stream: S) -> Self
    where
        S: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let reader = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buffer) => buffer.extend_from_slice(&chunk[..n]),
                        Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                    },
                }
            }
        });
        Self { buffer, reader }
    }

    /// Waits up to `grace` for EOF, then stops reading and returns what was
    /// captured so far.
    async fn finish(mut self, grace: Duration) -> String {
        if tokio::time::timeout(grace, &mut self.reader).await.is_err() {
            debug!("Output pipe still open after {:?}, abandoning it", grace);
            self.reader.abort();
        }
        let bytes = match self.buffer.lock() {
            Ok(buffer) => buffer.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Program name for a tool that ships as a `.cmd` shim on Windows.
pub(crate) fn shim(program: &str) -> String {
    if cfg!(windows) {
        format!("{}.cmd", program)
    } else {
        program.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_display() {
        let cmd = CommandSpec::new("npm", ["run", "build"]);
        assert_eq!(cmd.to_string(), "npm run build");
    }

    #[test]
    fn test_output_success() {
        let ok = CommandOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(ok.success());

        let failed = CommandOutput {
            exit_code: Some(2),
            ..Default::default()
        };
        assert!(!failed.success());

        let timed_out = CommandOutput {
            exit_code: Some(0),
            timed_out: true,
            ..Default::default()
        };
        assert!(!timed_out.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemProcessRunner::default();

        let output = runner
            .run(
                &CommandSpec::new("sh", ["-c", "pwd; echo oops >&2; exit 3"]),
                dir.path(),
            )
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stderr.trim(), "oops");
        let reported = std::fs::canonicalize(output.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemProcessRunner::new(Some(Duration::from_millis(100)));

        let output = runner
            .run(&CommandSpec::new("sleep", ["5"]), dir.path())
            .await
            .unwrap();

        assert!(output.timed_out);
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout_ignores_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemProcessRunner::new(Some(Duration::from_millis(200)));

        let started = std::time::Instant::now();
        let output = runner
            .run(
                &CommandSpec::new("sh", ["-c", "echo started; sleep 6 & sleep 6"]),
                dir.path(),
            )
            .await
            .unwrap();

        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(output.stdout.trim(), "started");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_returns_when_child_exits_before_background_job() {
        let dir = tempfile::tempdir().unwrap();
        let runner = SystemProcessRunner::default();

        let started = std::time::Instant::now();
        let output = runner
            .run(&CommandSpec::new("sh", ["-c", "sleep 6 & exit 0"]), dir.path())
            .await
            .unwrap();

        assert!(output.success());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let result = SystemProcessRunner::default()
            .run(
                &CommandSpec::new("cmsi-definitely-not-a-real-program", Vec::<String>::new()),
                dir.path(),
            )
            .await;

        assert!(result.is_err());
    }
}
