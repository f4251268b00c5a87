//! From raw output lines to typed messages.
//!
//! # Overview
//!
//! A query's worker moves every line through three stages:
//!
//! - [`StreamParser`] - a rule-table state machine turning lines into
//!   [`StreamEvent`]s
//! - [`ToolCallCorrelator`] - assigns tool ids and pairs results with calls
//! - [`MessageStream`] - the bounded channel the caller reads
//!   [`Message`](crate::Message)s from
//!
//! The parser and correlator are synchronous and know nothing about processes,
//! so they can be driven directly:
//!
//! ```
//! use claude_conduit::stream::{StreamEvent, StreamParser};
//!
//! let events = StreamParser::parse_all(["Claude: Hello", "world"]);
//! assert_eq!(events[0].text(), Some("Hello\nworld"));
//! assert_eq!(events[1], StreamEvent::StreamComplete);
//! ```

pub mod correlator;
pub mod events;
pub mod parser;
pub mod response;

pub use correlator::{Correlated, ToolCallCorrelator};
pub use events::StreamEvent;
pub use parser::{classify, LineKind, ParserState, StreamParser, RULES};
pub use response::{with_timeout, CollectedResponse, MessageStream, QueryState, CHANNEL_CAPACITY};
