//! Pairs tool results with the invocations they answer.
//!
//! The parser reports ids only when the CLI embedded one. The correlator
//! gives every invocation a stable id (synthesizing `tool_N` when needed) and
//! resolves each result against the invocations still open, oldest first.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::events::StreamEvent;
use crate::protocol::{Content, ToolCall};
use crate::tools::ToolObserver;

/// Output of [`ToolCallCorrelator::correlate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Correlated {
    /// A non-tool event, passed through unchanged.
    Event(StreamEvent),
    /// An invocation with its final id.
    ToolCall(ToolCall),
    /// A result bound to an invocation id.
    ToolResult {
        tool_call_id: String,
        content: Content,
        is_error: bool,
        /// False when the id matched no open invocation.
        resolved: bool,
    },
}

/// Per-session tool id bookkeeping.
///
/// Synthetic ids come from a counter that only ever grows, so an id handed
/// out in one query is never reused by a later query in the same session.
pub struct ToolCallCorrelator {
    next_synthetic: u64,
    open: VecDeque<String>,
    seen: HashSet<String>,
    observer: Option<Arc<dyn ToolObserver>>,
}

impl std::fmt::Debug for ToolCallCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallCorrelator")
            .field("next_synthetic", &self.next_synthetic)
            .field("open", &self.open)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl Default for ToolCallCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCallCorrelator {
    pub fn new() -> Self {
        Self {
            next_synthetic: 1,
            open: VecDeque::new(),
            seen: HashSet::new(),
            observer: None,
        }
    }

    /// Replace the observer notified of correlated calls and results.
    pub fn set_observer(&mut self, observer: Option<Arc<dyn ToolObserver>>) {
        self.observer = observer;
    }

    /// Invocations still waiting for a result, oldest first.
    pub fn open_calls(&self) -> impl Iterator<Item = &str> {
        self.open.iter().map(String::as_str)
    }

    /// Forget open invocations before a new query. The synthetic counter is
    /// kept.
    pub fn reset(&mut self) {
        self.open.clear();
        self.seen.clear();
    }

    pub fn correlate(&mut self, event: StreamEvent) -> Correlated {
        match event {
            StreamEvent::ToolInvocation {
                id,
                name,
                raw_arguments,
            } => Correlated::ToolCall(self.invocation(id, name, &raw_arguments)),
            StreamEvent::ToolResult {
                tool_id,
                content,
                is_error,
            } => self.result(tool_id, content, is_error),
            other => Correlated::Event(other),
        }
    }

    fn invocation(&mut self, id: Option<String>, name: String, raw_arguments: &str) -> ToolCall {
        let id = match id {
            Some(id) if !self.seen.contains(&id) => id,
            Some(duplicate) => {
                let fresh = self.synthesize();
                tracing::warn!(%duplicate, %fresh, "duplicate tool id, assigning a fresh one");
                fresh
            }
            None => self.synthesize(),
        };

        self.seen.insert(id.clone());
        self.open.push_back(id.clone());

        let call = ToolCall::new(id, name, raw_arguments);
        if let Some(observer) = &self.observer {
            observer.on_tool_call(&call);
        }
        call
    }

    fn result(&mut self, tool_id: Option<String>, content: Content, is_error: bool) -> Correlated {
        let (tool_call_id, resolved) = match tool_id {
            Some(id) => match self.open.iter().position(|open| *open == id) {
                Some(pos) => {
                    self.open.remove(pos);
                    (id, true)
                }
                // A further result for an answered call still pairs with it.
                None if self.seen.contains(&id) => (id, true),
                None => {
                    tracing::warn!(tool_id = %id, "tool result references unknown invocation");
                    (id, false)
                }
            },
            None => match self.open.pop_front() {
                Some(id) => (id, true),
                None => {
                    let id = self.synthesize();
                    tracing::warn!(tool_id = %id, "tool result with no open invocation");
                    (id, false)
                }
            },
        };

        if let Some(observer) = &self.observer {
            observer.on_tool_result(&tool_call_id, &content, is_error, resolved);
        }

        Correlated::ToolResult {
            tool_call_id,
            content,
            is_error,
            resolved,
        }
    }

    /// Next `tool_N` id not already taken by an embedded one.
    fn synthesize(&mut self) -> String {
        loop {
            let id = format!("tool_{}", self.next_synthetic);
            self.next_synthetic += 1;
            if !self.seen.contains(&id) {
                return id;
            }
        }
    }
}
