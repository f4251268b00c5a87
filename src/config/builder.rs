//! Query configuration and builder.
//!
//! [`ClientConfig`] is the immutable value every query is driven by. Nothing in
//! the crate mutates a config once built; sessions derive per-turn copies with
//! their own identity filled in.
//!
//! # Example
//!
//! ```ignore
//! use claude_conduit::config::{ClientConfig, Model, PermissionMode};
//!
//! let config = ClientConfig::builder()
//!     .model(Model::Opus)
//!     .permission_mode(PermissionMode::AcceptEdits)
//!     .system_prompt("You are a helpful assistant.")
//!     .max_turns(4)
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::options::{Model, SessionId};
use crate::tools::ToolObserver;
use crate::{Error, Result};

/// Environment variable consulted when no explicit CLI path is configured.
pub const ENV_CLI_PATH: &str = "CLAUDE_CLI_PATH";

/// Default executable name, resolved through `PATH`.
pub const DEFAULT_CLI: &str = "claude";

/// Configuration for one or more queries.
///
/// Use [`ClientConfig::builder()`] to create a new configuration.
#[derive(Clone)]
pub struct ClientConfig {
    // Model and permissions
    pub(crate) model: Option<Model>,
    pub(crate) permission_mode: Option<String>,

    // System prompts
    pub(crate) system_prompt: Option<String>,
    pub(crate) append_system_prompt: Option<String>,

    // Limits
    pub(crate) max_turns: u32,

    // Tools configuration
    pub(crate) allowed_tools: Vec<String>,
    pub(crate) disallowed_tools: Vec<String>,
    pub(crate) mcp_config: Option<PathBuf>,

    // Session options
    pub(crate) session_id: Option<SessionId>,
    pub(crate) resume: bool,
    pub(crate) continue_session: bool,

    // Process options
    pub(crate) cli_path: Option<PathBuf>,
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) env_vars: HashMap<String, String>,
    pub(crate) inherit_env: bool,

    pub(crate) tool_observer: Option<Arc<dyn ToolObserver>>,
}

impl ClientConfig {
    /// Create a new builder for ClientConfig.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    /// The permission mode as configured (validated when arguments are built).
    pub fn permission_mode(&self) -> Option<&str> {
        self.permission_mode.as_deref()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Maximum number of turns; zero means unlimited.
    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    pub fn allowed_tools(&self) -> &[String] {
        &self.allowed_tools
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn working_directory(&self) -> Option<&PathBuf> {
        self.working_directory.as_ref()
    }

    pub fn tool_observer(&self) -> Option<&Arc<dyn ToolObserver>> {
        self.tool_observer.as_ref()
    }

    /// The executable to launch: explicit path, then `CLAUDE_CLI_PATH`, then `claude`.
    pub fn cli_command(&self) -> String {
        if let Some(path) = &self.cli_path {
            return path.display().to_string();
        }
        std::env::var(ENV_CLI_PATH)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLI.to_string())
    }

    pub(crate) fn env_vars(&self) -> &HashMap<String, String> {
        &self.env_vars
    }

    pub(crate) fn inherit_env(&self) -> bool {
        self.inherit_env
    }

    /// Copy of this config bound to a session identity.
    ///
    /// `resume` selects `--resume` over `--session-id`. Model and working
    /// directory fall back to the session's own when this config has none.
    pub(crate) fn for_session(
        &self,
        id: &SessionId,
        resume: bool,
        model: Option<&Model>,
        working_directory: &Path,
    ) -> ClientConfig {
        let mut cfg = self.clone();
        cfg.session_id = Some(id.clone());
        cfg.resume = resume;
        if cfg.model.is_none() {
            cfg.model = model.cloned();
        }
        if cfg.working_directory.is_none() {
            cfg.working_directory = Some(working_directory.to_path_buf());
        }
        cfg
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::default().into_config()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("model", &self.model)
            .field("permission_mode", &self.permission_mode)
            .field("system_prompt", &self.system_prompt)
            .field("append_system_prompt", &self.append_system_prompt)
            .field("max_turns", &self.max_turns)
            .field("allowed_tools", &self.allowed_tools)
            .field("disallowed_tools", &self.disallowed_tools)
            .field("mcp_config", &self.mcp_config)
            .field("session_id", &self.session_id)
            .field("resume", &self.resume)
            .field("continue_session", &self.continue_session)
            .field("cli_path", &self.cli_path)
            .field("working_directory", &self.working_directory)
            .field("timeout", &self.timeout)
            .field("env_vars", &self.env_vars.keys().collect::<Vec<_>>())
            .field("inherit_env", &self.inherit_env)
            .field("tool_observer", &self.tool_observer.is_some())
            .finish()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Clone)]
pub struct ClientConfigBuilder {
    model: Option<Model>,
    permission_mode: Option<String>,
    system_prompt: Option<String>,
    append_system_prompt: Option<String>,
    max_turns: u32,
    allowed_tools: Vec<String>,
    disallowed_tools: Vec<String>,
    mcp_config: Option<PathBuf>,
    session_id: Option<SessionId>,
    resume: bool,
    continue_session: bool,
    cli_path: Option<PathBuf>,
    working_directory: Option<PathBuf>,
    timeout: Option<Duration>,
    env_vars: HashMap<String, String>,
    inherit_env: bool,
    tool_observer: Option<Arc<dyn ToolObserver>>,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            model: None,
            permission_mode: None,
            system_prompt: None,
            append_system_prompt: None,
            max_turns: 0,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            mcp_config: None,
            session_id: None,
            resume: false,
            continue_session: false,
            cli_path: None,
            working_directory: None,
            timeout: None,
            env_vars: HashMap::new(),
            inherit_env: true,
            tool_observer: None,
        }
    }
}

impl fmt::Debug for ClientConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.clone().into_config(), f)
    }
}

impl ClientConfigBuilder {
    // -------------------------------------------------------------------------
    // Model and permissions
    // -------------------------------------------------------------------------

    /// Set the model to use.
    pub fn model(mut self, model: impl Into<Model>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the permission mode for tool execution.
    ///
    /// Accepts a [`PermissionMode`](super::PermissionMode) or its CLI
    /// spelling. Unknown spellings are rejected when arguments are built.
    pub fn permission_mode(mut self, mode: impl Into<String>) -> Self {
        self.permission_mode = Some(mode.into());
        self
    }

    // -------------------------------------------------------------------------
    // System prompts
    // -------------------------------------------------------------------------

    /// Set the system prompt (replaces default).
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Append to the system prompt (added after default).
    pub fn append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.append_system_prompt = Some(prompt.into());
        self
    }

    // -------------------------------------------------------------------------
    // Limits and tools
    // -------------------------------------------------------------------------

    /// Maximum number of turns per query. Zero disables the limit.
    pub fn max_turns(mut self, turns: u32) -> Self {
        self.max_turns = turns;
        self
    }

    /// Set allowed tools (whitelist).
    pub fn allowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Set disallowed tools (blacklist).
    pub fn disallowed_tools(mut self, tools: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.disallowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Path to an MCP configuration file handed to the CLI.
    pub fn mcp_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.mcp_config = Some(path.into());
        self
    }

    // -------------------------------------------------------------------------
    // Session options
    // -------------------------------------------------------------------------

    /// Session identity for the query.
    pub fn session_id(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Ask the CLI to resume `session_id` rather than start it.
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Continue the most recent session.
    pub fn continue_session(mut self, cont: bool) -> Self {
        self.continue_session = cont;
        self
    }

    // -------------------------------------------------------------------------
    // Process options
    // -------------------------------------------------------------------------

    /// Path to claude CLI binary (default: `CLAUDE_CLI_PATH`, then `claude` on PATH).
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_path = Some(path.into());
        self
    }

    /// Working directory for claude process.
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    /// Deadline for a whole query.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Add/override environment variable for subprocess.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Don't inherit parent environment (default: inherit).
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// Observe tool invocations and results as they are correlated.
    pub fn tool_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.tool_observer = Some(observer);
        self
    }

    // -------------------------------------------------------------------------
    // Build
    // -------------------------------------------------------------------------

    /// Build the configuration.
    ///
    /// Only the working directory is checked here. Flag compatibility is
    /// checked by [`build_args`](super::build_args), the single place that
    /// knows the CLI's vocabulary.
    pub fn build(self) -> Result<ClientConfig> {
        if let Some(ref dir) = self.working_directory {
            if !dir.is_dir() {
                return Err(Error::InvalidConfig(format!(
                    "working directory does not exist: {}",
                    dir.display()
                )));
            }
        }

        Ok(self.into_config())
    }

    fn into_config(self) -> ClientConfig {
        ClientConfig {
            model: self.model,
            permission_mode: self.permission_mode,
            system_prompt: self.system_prompt,
            append_system_prompt: self.append_system_prompt,
            max_turns: self.max_turns,
            allowed_tools: self.allowed_tools,
            disallowed_tools: self.disallowed_tools,
            mcp_config: self.mcp_config,
            session_id: self.session_id,
            resume: self.resume,
            continue_session: self.continue_session,
            cli_path: self.cli_path,
            working_directory: self.working_directory,
            timeout: self.timeout,
            env_vars: self.env_vars,
            inherit_env: self.inherit_env,
            tool_observer: self.tool_observer,
        }
    }
}
