//! Spawning the CLI with tokio and driving the child process.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use super::io::{drain_stderr, LineReader, ProcessWriter, StderrTail};
use super::{CommandSpec, Launcher, ProcessExit, ProcessHandle, MIN_CLI_VERSION};
use crate::stream::with_timeout;
use crate::{Error, Result};

/// How long `wait` lets the stderr drain catch up after the child exits.
const STDERR_SETTLE: Duration = Duration::from_millis(200);

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A running CLI process.
///
/// # Cancellation
///
/// Dropping a `CliProcess` kills the subprocess if it's still running.
pub struct CliProcess {
    child: Child,
    pid: Option<u32>,
    stdout: LineReader<ChildStdout>,
    stderr: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
    running: bool,
}

impl CliProcess {
    /// Spawn `spec`. A prompt in `spec.stdin` is written by a background task
    /// so a chatty child can't deadlock against us.
    pub async fn spawn(spec: &CommandSpec) -> Result<Self> {
        let mut cmd = build_command(spec);
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CliNotFound {
                    searched: spec.program.clone(),
                }
            } else {
                Error::ProcessSpawn(e)
            }
        })?;

        let pid = child.id();
        tracing::debug!(pid = ?pid, program = %spec.program, args = spec.args.len(), "spawned cli");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::stream("stdout was not captured"))?;

        let stderr = StderrTail::new();
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| drain_stderr(pipe, stderr.clone(), pid));

        if let (Some(prompt), Some(stdin)) = (spec.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = ProcessWriter::new(stdin).write_prompt(&prompt).await {
                    tracing::debug!(pid = ?pid, error = %e, "writing prompt to stdin failed");
                }
            });
        }

        Ok(Self {
            child,
            pid,
            stdout: LineReader::new(stdout),
            stderr,
            stderr_task,
            running: true,
        })
    }
}

#[async_trait]
impl ProcessHandle for CliProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_running(&mut self) -> bool {
        if self.running {
            match self.child.try_wait() {
                Ok(None) => {}
                Ok(Some(_)) | Err(_) => self.running = false,
            }
        }
        self.running
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        self.stdout.next_line().await
    }

    async fn kill(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        tracing::debug!(pid = ?self.pid, "killing cli");
        self.running = false;
        self.child.kill().await.map_err(Error::io)
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await.map_err(Error::io)?;
        self.running = false;
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(STDERR_SETTLE, task).await;
        }
        Ok(ProcessExit {
            code: status.code(),
            success: status.success(),
        })
    }

    fn stderr_tail(&self) -> String {
        self.stderr.snapshot()
    }
}

impl Drop for CliProcess {
    fn drop(&mut self) {
        if self.running {
            let _ = self.child.start_kill();
        }
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }
    if !spec.inherit_env {
        cmd.env_clear();
    }
    cmd.envs(&spec.env);

    cmd.stdin(if spec.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd
}

/// Production [`Launcher`]: spawns real processes with tokio.
///
/// The first launch runs `<program> --version` and warns when the CLI is
/// older than [`MIN_CLI_VERSION`].
#[derive(Debug)]
pub struct TokioLauncher {
    check_version: bool,
    checked: AtomicBool,
}

impl Default for TokioLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl TokioLauncher {
    pub fn new() -> Self {
        Self {
            check_version: true,
            checked: AtomicBool::new(false),
        }
    }

    /// A launcher that never runs the version check.
    pub fn without_version_check() -> Self {
        Self {
            check_version: false,
            checked: AtomicBool::new(true),
        }
    }

    async fn check_version_once(&self, program: &str) {
        if !self.check_version || self.checked.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = check_cli_version(program).await {
            tracing::debug!(error = %e, "cli version check failed");
        }
    }
}

#[async_trait]
impl Launcher for TokioLauncher {
    async fn launch(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>> {
        self.check_version_once(&spec.program).await;
        let process = CliProcess::spawn(spec).await?;
        Ok(Box::new(process))
    }
}

async fn check_cli_version(program: &str) -> Result<()> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = with_timeout(VERSION_CHECK_TIMEOUT, async {
        output.await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CliNotFound {
                    searched: program.to_string(),
                }
            } else {
                Error::io(e)
            }
        })
    })
    .await?;

    if !output.status.success() {
        tracing::debug!("--version returned non-zero exit code");
        return Ok(());
    }

    let text = String::from_utf8_lossy(&output.stdout);
    match parse_version(&text) {
        Some(version) if version_below_min(version) => tracing::warn!(
            version = %text.trim(),
            minimum = MIN_CLI_VERSION,
            "claude CLI is older than the minimum supported version"
        ),
        Some(_) => tracing::debug!(version = %text.trim(), "claude CLI version"),
        None => tracing::debug!(output = %text.trim(), "could not parse CLI version"),
    }
    Ok(())
}

/// Parse `claude 2.0.76` (or `v2.0.76-beta`) into `(major, minor, patch)`.
fn parse_version(s: &str) -> Option<(u32, u32, u32)> {
    fn numeric_prefix(part: &str) -> Option<u32> {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }

    s.split_whitespace().find_map(|word| {
        let word = word.strip_prefix('v').unwrap_or(word);
        let mut parts = word.split('.');
        let major = numeric_prefix(parts.next()?)?;
        let minor = numeric_prefix(parts.next()?)?;
        let patch = numeric_prefix(parts.next()?)?;
        Some((major, minor, patch))
    })
}

fn version_below_min(version: (u32, u32, u32)) -> bool {
    let min = parse_version(MIN_CLI_VERSION).unwrap_or((2, 0, 0));
    version < min
}
