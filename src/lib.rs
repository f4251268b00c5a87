//! # claude-conduit
//!
//! Sessions and streaming for the Claude Code CLI.
//!
//! The CLI runs as a subprocess in print mode and writes plain text lines.
//! This crate turns those lines into typed [`Message`]s and adds the pieces a
//! long-running host needs around them:
//! - Sessions with stable ids and turn counting, held in a [`SessionRegistry`]
//! - A rule-table [`StreamParser`] and a [`ToolCallCorrelator`]
//! - Bounded, cancellable [`MessageStream`]s with turn-limit enforcement
//! - Tool observation callbacks
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use claude_conduit::{ClientConfig, QueryOrchestrator, Result, SessionRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = Arc::new(SessionRegistry::with_default_launcher());
//!     let orchestrator = QueryOrchestrator::new(Arc::clone(&registry));
//!
//!     let config = ClientConfig::builder().session_id("demo").max_turns(4).build()?;
//!     let response = orchestrator
//!         .query_collect(&CancellationToken::new(), "What is 2+2?", &config)
//!         .await?;
//!     println!("{}", response.assistant_text());
//!
//!     registry.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Streaming
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let session = registry.get_or_create("demo")?;
//! let mut stream = session.query(&cancel, "Write a poem", &config)?;
//! while let Some(msg) = stream.next().await {
//!     let msg = msg?;
//!     println!("[{}] {}", msg.role, msg.text());
//! }
//! assert!(stream.state().is_terminal());
//! ```
//!
//! ## Configuration
//!
//! ```
//! use claude_conduit::{ClientConfig, Model, PermissionMode};
//!
//! let config = ClientConfig::builder()
//!     .model(Model::Opus)
//!     .permission_mode(PermissionMode::Plan)
//!     .allowed_tools(["Read", "Grep"])
//!     .max_turns(3)
//!     .build()
//!     .unwrap();
//! let args = claude_conduit::config::build_args(&config).unwrap();
//! assert_eq!(args[0], "--print");
//! ```

pub mod config;
mod error;
pub mod orchestrator;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod stream;
pub mod tools;

pub use error::{Error, Result};

// Re-export the main entry points at crate root
pub use orchestrator::QueryOrchestrator;
pub use registry::SessionRegistry;
pub use session::Session;

// Re-export commonly used config types at crate root
pub use config::{ClientConfig, ClientConfigBuilder, Model, PermissionMode, SessionId};

// Re-export commonly used protocol types at crate root
pub use protocol::{Content, ContentBlock, Message, Role, ToolCall};

// Re-export commonly used process types at crate root
pub use process::{CommandSpec, Launcher, ProcessExit, ProcessHandle, TokioLauncher};

// Re-export commonly used stream types at crate root
pub use stream::{
    CollectedResponse, MessageStream, QueryState, StreamEvent, StreamParser, ToolCallCorrelator,
};

// Re-export tool observation types at crate root
pub use tools::{LogLevel, LoggingObserver, ToolObserver};
