//! Typed messages delivered to callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::Content;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A tool invocation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable identifier, embedded by the CLI or synthesized per session.
    pub id: String,
    /// Name of the tool being invoked.
    pub name: String,
    /// Arguments as JSON when they parsed, otherwise the raw text as a string.
    pub arguments: Value,
}

impl ToolCall {
    /// Build a tool call from the raw argument text.
    pub fn new(id: impl Into<String>, name: impl Into<String>, raw_arguments: &str) -> Self {
        let arguments = if raw_arguments.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(raw_arguments)
                .unwrap_or_else(|_| Value::String(raw_arguments.to_string()))
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One application-level message reconstructed from the CLI's output.
///
/// A tool-role message carries the id of the call it answers in
/// `tool_call_id`. When that id could not be matched to an earlier
/// invocation the message is still delivered, with `unresolved` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// The tool reported an error result.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    /// A tool result that references no known invocation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unresolved: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Message {
    fn with_role(role: Role, content: impl Into<Content>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            unresolved: false,
        }
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// System-role message; diagnostics use this so transcripts render them.
    pub fn system(content: impl Into<Content>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// An assistant message carrying a single tool call and no text.
    pub fn tool_call(call: ToolCall) -> Self {
        let mut msg = Self::with_role(Role::Assistant, Content::default());
        msg.tool_calls.push(call);
        msg
    }

    /// A tool-role message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: Option<String>, content: impl Into<Content>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = tool_call_id;
        msg
    }

    /// Content flattened to text.
    pub fn text(&self) -> String {
        self.content.as_text()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
