//! Tool observer trait and a tracing-backed implementation.

use crate::protocol::{Content, ToolCall};

/// Observer for tool activity seen in a session's output.
///
/// Callbacks run synchronously on the session's worker task, after ids have
/// been correlated. Keep them cheap; a slow observer delays delivery.
/// Both methods default to doing nothing.
pub trait ToolObserver: Send + Sync {
    /// The assistant invoked a tool. `call.id` is final (embedded or
    /// synthesized).
    fn on_tool_call(&self, call: &ToolCall) {
        let _ = call;
    }

    /// A tool produced output for `tool_call_id`.
    ///
    /// `resolved` is false when the id matched no open invocation.
    fn on_tool_result(&self, tool_call_id: &str, content: &Content, is_error: bool, resolved: bool) {
        let _ = (tool_call_id, content, is_error, resolved);
    }
}

/// Logs tool activity with `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LoggingObserver {
    level: LogLevel,
}

/// Level used by [`LoggingObserver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
}

/// Longest result excerpt written to the log.
const MAX_LOGGED_CONTENT: usize = 200;

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: LogLevel) -> Self {
        Self { level }
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::trace!($($arg)+),
            LogLevel::Debug => tracing::debug!($($arg)+),
            LogLevel::Info => tracing::info!($($arg)+),
        }
    };
}

impl ToolObserver for LoggingObserver {
    fn on_tool_call(&self, call: &ToolCall) {
        log_at!(
            self.level,
            tool_id = %call.id,
            tool_name = %call.name,
            arguments = %call.arguments,
            "tool call"
        );
    }

    fn on_tool_result(&self, tool_call_id: &str, content: &Content, is_error: bool, resolved: bool) {
        let text = excerpt(&content.as_text());
        log_at!(
            self.level,
            tool_id = %tool_call_id,
            is_error,
            resolved,
            content = %text,
            "tool result"
        );
    }
}

fn excerpt(text: &str) -> String {
    if text.len() <= MAX_LOGGED_CONTENT {
        return text.to_string();
    }
    let mut end = MAX_LOGGED_CONTENT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes total)", &text[..end], text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn tool_observer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn ToolObserver>();
        assert_send_sync::<LoggingObserver>();
    }

    #[test]
    fn default_methods_do_nothing() {
        struct Silent;
        impl ToolObserver for Silent {}

        let observer = Silent;
        observer.on_tool_call(&ToolCall::new("t1", "Read", "{}"));
        observer.on_tool_result("t1", &Content::from("ok"), false, true);
    }

    #[test]
    fn counting_observer_through_arc() {
        #[derive(Default)]
        struct Counter {
            calls: AtomicUsize,
            unresolved: AtomicUsize,
        }
        impl ToolObserver for Counter {
            fn on_tool_call(&self, _call: &ToolCall) {
                self.calls.fetch_add(1, Ordering::SeqCst);
            }
            fn on_tool_result(&self, _id: &str, _content: &Content, _is_error: bool, resolved: bool) {
                if !resolved {
                    self.unresolved.fetch_add(1, Ordering::SeqCst);
                }
            }
        }

        let counter = Arc::new(Counter::default());
        let observer: Arc<dyn ToolObserver> = counter.clone();
        observer.on_tool_call(&ToolCall::new("t1", "Read", "{}"));
        observer.on_tool_result("t1", &Content::from("ok"), false, true);
        observer.on_tool_result("t9", &Content::from("??"), false, false);

        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert_eq!(counter.unresolved.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn logging_observer_levels() {
        for level in [LogLevel::Trace, LogLevel::Debug, LogLevel::Info] {
            let observer = LoggingObserver::with_level(level);
            observer.on_tool_call(&ToolCall::new("t1", "Bash", "ls"));
            observer.on_tool_result("t1", &Content::from("x".repeat(500)), true, true);
        }
        assert_eq!(LoggingObserver::new().level, LogLevel::Debug);
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let long = "é".repeat(150);
        let cut = excerpt(&long);
        assert!(cut.ends_with("(300 bytes total)"));
        assert_eq!(excerpt("short"), "short");
    }
}
