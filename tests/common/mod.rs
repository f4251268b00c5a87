//! Test utilities for claude-conduit integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use claude_conduit::process::{CommandSpec, Launcher, ProcessExit, ProcessHandle};
use claude_conduit::{Error, Result, SessionRegistry};

/// What one fake process does.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub lines: Vec<String>,
    /// After the lines, block forever instead of reaching end of output.
    pub hang: bool,
    /// After the lines, fail the read with a broken pipe.
    pub broken: bool,
    pub exit_code: i32,
    pub stderr: String,
    /// Fail the launch as if the executable were missing.
    pub missing: bool,
}

impl Script {
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn then_hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn then_break(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn exit(mut self, code: i32, stderr: &str) -> Self {
        self.exit_code = code;
        self.stderr = stderr.to_string();
        self
    }
}

/// A process that replays a [`Script`].
pub struct FakeProcess {
    pid: u32,
    lines: VecDeque<String>,
    script: Script,
    running: bool,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_running(&mut self) -> bool {
        self.running
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(line) = self.lines.pop_front() {
            return Ok(Some(line));
        }
        if self.script.broken {
            return Err(Error::io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe closed",
            )));
        }
        if self.script.hang && self.running {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    async fn kill(&mut self) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.running = false;
        Ok(())
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        self.running = false;
        Ok(ProcessExit {
            code: Some(self.script.exit_code),
            success: self.script.exit_code == 0,
        })
    }

    fn stderr_tail(&self) -> String {
        self.script.stderr.clone()
    }
}

/// A launcher that hands out scripted processes and records every launch.
///
/// Scripts are used in order; the last one repeats.
pub struct ScriptedLauncher {
    scripts: Mutex<VecDeque<Script>>,
    specs: Mutex<Vec<CommandSpec>>,
    pids: Mutex<Vec<u32>>,
    kills: Arc<AtomicUsize>,
    next_pid: AtomicU32,
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Arc<Self> {
        Self::sequence(vec![script])
    }

    pub fn sequence(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            specs: Mutex::new(Vec::new()),
            pids: Mutex::new(Vec::new()),
            kills: Arc::new(AtomicUsize::new(0)),
            next_pid: AtomicU32::new(1000),
        })
    }

    /// A registry whose sessions launch through this launcher.
    pub fn registry(self: &Arc<Self>) -> SessionRegistry {
        SessionRegistry::new(Arc::clone(self) as Arc<dyn Launcher>)
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn launches(&self) -> usize {
        self.specs.lock().unwrap().len()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.pids.lock().unwrap().clone()
    }

    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        if scripts.len() > 1 {
            scripts.pop_front().unwrap()
        } else {
            scripts.front().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl Launcher for ScriptedLauncher {
    async fn launch(&self, spec: &CommandSpec) -> Result<Box<dyn ProcessHandle>> {
        self.specs.lock().unwrap().push(spec.clone());
        let script = self.next_script();
        if script.missing {
            return Err(Error::CliNotFound {
                searched: spec.program.clone(),
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.pids.lock().unwrap().push(pid);
        Ok(Box::new(FakeProcess {
            pid,
            lines: script.lines.iter().cloned().collect(),
            script,
            running: true,
            kills: Arc::clone(&self.kills),
        }))
    }
}

/// Builder for realistic CLI output.
#[derive(Debug, Default)]
pub struct ScenarioBuilder {
    lines: Vec<String>,
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assistant(mut self, text: &str) -> Self {
        self.push_block("Claude:", text);
        self
    }

    pub fn user(mut self, text: &str) -> Self {
        self.push_block("Human:", text);
        self
    }

    pub fn tool_json(mut self, id: &str, name: &str, input: serde_json::Value) -> Self {
        let payload = serde_json::json!({"id": id, "name": name, "input": input});
        self.lines.push(format!("Tool: {payload}"));
        self
    }

    pub fn tool_raw(mut self, payload: &str) -> Self {
        self.lines.push(format!("Tool: {payload}"));
        self
    }

    pub fn result(mut self, text: &str) -> Self {
        self.lines.push(format!("Result: {text}"));
        self
    }

    pub fn result_for(mut self, tool_use_id: &str, content: &str) -> Self {
        let payload = serde_json::json!({"tool_use_id": tool_use_id, "content": content});
        self.lines.push(format!("Result: {payload}"));
        self
    }

    pub fn line(mut self, raw: &str) -> Self {
        self.lines.push(raw.to_string());
        self
    }

    pub fn done(self) -> Self {
        self.line("[DONE]")
    }

    pub fn build(self) -> Vec<String> {
        self.lines
    }

    pub fn script(self) -> Script {
        Script::lines(self.lines)
    }

    fn push_block(&mut self, marker: &str, text: &str) {
        let mut lines = text.lines();
        self.lines
            .push(format!("{marker} {}", lines.next().unwrap_or_default()));
        self.lines.extend(lines.map(str::to_string));
    }
}

/// The value following `flag` in `args`.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let at = args.iter().position(|a| a == flag)?;
    args.get(at + 1).map(String::as_str)
}
