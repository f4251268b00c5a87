//! Process management for the CLI.
//!
//! Every query spawns a fresh CLI process in print mode. Session continuity is
//! requested with `--session-id`/`--resume` flags, not by keeping a process
//! alive.
//!
//! # Architecture
//!
//! ```text
//! claude-conduit                      claude CLI
//! ┌──────────────┐                   ┌─────────────┐
//! │ ProcessHandle│──stdin (prompt)──▶│             │
//! │              │◀─stdout (lines)───│             │
//! │              │◀─stderr (logs)────│             │
//! └──────────────┘                   └─────────────┘
//! ```
//!
//! The [`Launcher`] and [`ProcessHandle`] traits are the seam between the
//! orchestrator and the operating system; tests substitute scripted fakes.
//!
//! # Input Protocol
//!
//! - The prompt is the final positional argument, after a `--` separator
//! - Prompts longer than [`MAX_ARG_PROMPT_LEN`] are piped to stdin instead
//!
//! # Output Protocol
//!
//! Plain text lines, interpreted by [`StreamParser`](crate::stream::StreamParser).

mod io;
mod spawn;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

pub use io::{drain_stderr, LineReader, ProcessWriter, StderrTail, STDERR_TAIL_BYTES};
pub use spawn::{CliProcess, TokioLauncher};

use crate::config::{build_args, ClientConfig};
use crate::Result;

/// Maximum prompt length to pass via command line argument.
/// Prompts longer than this will be piped via stdin.
/// Most systems have ~128KB argument limit; we use 64KB for safety.
pub const MAX_ARG_PROMPT_LEN: usize = 64 * 1024;

/// Minimum CLI version required for full compatibility.
pub const MIN_CLI_VERSION: &str = "2.0.0";

/// Everything needed to start one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub inherit_env: bool,
    /// Written to stdin, which is then closed. `None` leaves stdin null.
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            inherit_env: true,
            stdin: None,
        }
    }

    /// The invocation for `prompt` under `config`.
    ///
    /// Fails only when the configuration is rejected by [`build_args`].
    pub fn for_prompt(config: &ClientConfig, prompt: &str) -> Result<Self> {
        let mut spec = Self::new(config.cli_command());
        spec.args = build_args(config)?;
        if prompt.len() > MAX_ARG_PROMPT_LEN {
            spec.stdin = Some(prompt.to_string());
        } else {
            // A prompt starting with `-` must not be read as a flag.
            spec.args.push("--".to_string());
            spec.args.push(prompt.to_string());
        }
        spec.working_dir = config.working_directory().cloned();
        spec.env = config.env_vars().clone();
        spec.inherit_env = config.inherit_env();
        Ok(spec)
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub success: bool,
}

/// A running external process as the orchestrator sees it.
///
/// `kill` must unblock a pending `next_line` (by closing the output pipe) and
/// must be a no-op once the process is no longer running.
#[async_trait]
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Whether the process is still alive. Once false, stays false.
    fn is_running(&mut self) -> bool;

    /// Next output line without its terminator; `Ok(None)` at end of output.
    async fn next_line(&mut self) -> Result<Option<String>>;

    async fn kill(&mut self) -> Result<()>;

    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Recent stderr output, for diagnostics.
    fn stderr_tail(&self) -> String {
        String::new()
    }
}

/// Starts processes. Shared by every session of a registry.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>>;
}
