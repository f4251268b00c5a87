//! Typed messages exchanged with callers.
//!
//! The CLI speaks a line-oriented text protocol; the stream layer turns those
//! lines into the [`Message`] values defined here.
//!
//! # Example
//!
//! ```
//! use claude_conduit::protocol::{Content, Message, Role};
//!
//! let msg = Message::assistant("Hello");
//! assert_eq!(msg.role, Role::Assistant);
//! assert_eq!(msg.content, Content::Text("Hello".into()));
//! ```

mod content;
mod message;

pub use content::{Content, ContentBlock, ImageSource};
pub use message::{Message, Role, ToolCall};
