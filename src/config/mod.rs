//! Configuration for queries against the Claude CLI.
//!
//! This module provides:
//!
//! - [`ClientConfig`] and [`ClientConfigBuilder`], the immutable configuration
//!   every query is driven by
//! - [`build_args`], the single translation point from configuration to CLI flags
//! - Type-safe options like [`Model`], [`PermissionMode`], and [`SessionId`]
//! - Built-in tool constants in [`tools`]
//!
//! # Example
//!
//! ```ignore
//! use claude_conduit::config::{build_args, tools, ClientConfig, Model, PermissionMode};
//!
//! let config = ClientConfig::builder()
//!     .model(Model::Opus)
//!     .permission_mode(PermissionMode::Plan)
//!     .allowed_tools([tools::READ, tools::GREP])
//!     .build()?;
//!
//! let args = build_args(&config)?;
//! ```

pub mod args;
pub mod builder;
pub mod options;

pub use args::build_args;
pub use builder::{ClientConfig, ClientConfigBuilder, DEFAULT_CLI, ENV_CLI_PATH};
pub use options::{tools, Model, PermissionMode, SessionId};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_exports_accessible() {
        let _: Model = Model::Sonnet;
        let _: PermissionMode = PermissionMode::Default;
        let _: SessionId = SessionId::new("test");
        let _ = ClientConfig::builder();
    }
}
