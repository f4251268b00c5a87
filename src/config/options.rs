//! Type-safe configuration options for the Claude CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Model selection with escape hatch for new models.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Claude Sonnet (balanced performance and cost).
    #[default]
    Sonnet,
    /// Claude Opus (highest capability).
    Opus,
    /// Claude Haiku (fastest, lowest cost).
    Haiku,
    /// Custom model identifier for new or specialized models.
    #[serde(untagged)]
    Custom(String),
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::Sonnet => write!(f, "sonnet"),
            Model::Opus => write!(f, "opus"),
            Model::Haiku => write!(f, "haiku"),
            Model::Custom(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Model {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sonnet" => Model::Sonnet,
            "opus" => Model::Opus,
            "haiku" => Model::Haiku,
            _ => Model::Custom(s.to_string()),
        }
    }
}

impl From<String> for Model {
    fn from(s: String) -> Self {
        Model::from(s.as_str())
    }
}

/// Permission modes for CLI tool execution.
///
/// This is the closed set the CLI recognises. Configuration carries the mode
/// as text so that values loaded from elsewhere are only checked once, when
/// arguments are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Ask for permission for potentially dangerous operations.
    #[default]
    Default,
    /// Read-only, no tool execution allowed.
    Plan,
    /// Auto-approve file edits, ask for other tools.
    AcceptEdits,
    /// Auto-approve all tool calls.
    BypassPermissions,
}

impl PermissionMode {
    /// All recognised modes, in CLI spelling order.
    pub const ALL: [PermissionMode; 4] = [
        PermissionMode::Default,
        PermissionMode::Plan,
        PermissionMode::AcceptEdits,
        PermissionMode::BypassPermissions,
    ];

    /// The spelling the CLI expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::Plan => "plan",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "unknown permission mode {s:?} (expected one of: default, plan, acceptEdits, bypassPermissions)"
                ))
            })
    }
}

impl From<PermissionMode> for String {
    fn from(mode: PermissionMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Newtype for session IDs to prevent string mixups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new SessionId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// Generate a fresh random session ID (UUID v4).
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    /// Get the session ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        SessionId(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        SessionId(s.to_string())
    }
}

impl From<&SessionId> for SessionId {
    fn from(id: &SessionId) -> Self {
        id.clone()
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Built-in tool name constants.
///
/// Tools are extensible via MCP servers, so this is not an enum.
pub mod tools {
    pub const READ: &str = "Read";
    pub const WRITE: &str = "Write";
    pub const EDIT: &str = "Edit";
    pub const BASH: &str = "Bash";
    pub const GLOB: &str = "Glob";
    pub const GREP: &str = "Grep";
    pub const TASK: &str = "Task";
    pub const WEB_FETCH: &str = "WebFetch";
    pub const WEB_SEARCH: &str = "WebSearch";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_display_and_parse() {
        assert_eq!(Model::Opus.to_string(), "opus");
        assert_eq!(Model::from("HAIKU"), Model::Haiku);
        assert_eq!(
            Model::from("claude-sonnet-4-5"),
            Model::Custom("claude-sonnet-4-5".into())
        );
        assert_eq!(Model::Custom("x-1".into()).to_string(), "x-1");
    }

    #[test]
    fn permission_mode_parses_cli_spelling() {
        for mode in PermissionMode::ALL {
            assert_eq!(mode.as_str().parse::<PermissionMode>().unwrap(), mode);
        }
    }

    #[test]
    fn permission_mode_rejects_unknown_values() {
        let err = "yolo".parse::<PermissionMode>().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains("yolo")));
        // Case-sensitive, like the CLI.
        assert!("Plan".parse::<PermissionMode>().is_err());
    }

    #[test]
    fn session_id_usage() {
        let id = SessionId::new("test-session-123");
        assert_eq!(id.as_str(), "test-session-123");
        assert_eq!(id.to_string(), "test-session-123");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"test-session-123\"");
    }

    #[test]
    fn generated_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Model>();
        assert_send_sync::<PermissionMode>();
        assert_send_sync::<SessionId>();
    }
}
