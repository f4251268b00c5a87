//! Observation of tool activity.
//!
//! The CLI runs tools itself; a [`ToolObserver`] only watches the calls and
//! results as they are correlated.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use claude_conduit::{ClientConfig, Content, ToolCall, ToolObserver};
//!
//! struct Printer;
//!
//! impl ToolObserver for Printer {
//!     fn on_tool_call(&self, call: &ToolCall) {
//!         println!("{} -> {}", call.id, call.name);
//!     }
//!
//!     fn on_tool_result(&self, id: &str, content: &Content, is_error: bool, _resolved: bool) {
//!         println!("{id} (error={is_error}): {}", content.as_text());
//!     }
//! }
//!
//! let config = ClientConfig::builder()
//!     .tool_observer(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! assert!(config.tool_observer().is_some());
//! ```

mod observer;

pub use observer::{LogLevel, LoggingObserver, ToolObserver};
