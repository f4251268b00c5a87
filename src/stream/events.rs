//! Events produced by the [`StreamParser`](super::StreamParser).
//!
//! These sit between raw output lines and the [`Message`](crate::Message)
//! values callers see. Tool ids are still optional here; the
//! [`ToolCallCorrelator`](super::ToolCallCorrelator) fills them in.

use crate::protocol::{Content, Role};

/// A parsed event from the CLI's output.
///
/// # Event Order
///
/// Events come out in the order their blocks closed in the input. Text is
/// never split: one block yields one `TextDelta`. Exactly one terminal event
/// (`TurnLimitReached`, `StreamComplete` or `StreamError`) ends a parse.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A complete block of text from one author.
    TextDelta { role: Role, text: String },

    /// The assistant invoked a tool.
    ToolInvocation {
        /// Id embedded in the payload, if there was one.
        id: Option<String>,
        name: String,
        raw_arguments: String,
    },

    /// A tool produced output.
    ToolResult {
        /// Id of the invocation this answers, if the payload named one.
        tool_id: Option<String>,
        content: Content,
        is_error: bool,
    },

    /// The external tool (or the orchestrator) hit the turn limit.
    TurnLimitReached,

    /// The output ended normally.
    StreamComplete,

    /// The external tool reported a failure.
    StreamError { message: String },
}

impl StreamEvent {
    /// True for the events that end a parse.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::TurnLimitReached
                | StreamEvent::StreamComplete
                | StreamEvent::StreamError { .. }
        )
    }

    /// Get text from a TextDelta event.
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamEvent::TextDelta { text, .. } => Some(text),
            _ => None,
        }
    }
}
