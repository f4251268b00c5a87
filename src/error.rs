use std::time::Duration;

/// Errors that can occur when driving the Claude CLI.
///
/// Errors are organized by category:
/// - Configuration errors: detected at `build()` or argument-building time
/// - Spawn errors: failed to start the CLI process
/// - Stream errors: the process started but its output broke
/// - Session errors: misuse of a session or the registry
/// - Cancellation errors: the caller gave up or a deadline passed
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Configuration errors
    // -------------------------------------------------------------------------
    /// Invalid or self-contradicting configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // -------------------------------------------------------------------------
    // Spawn errors
    // -------------------------------------------------------------------------
    /// Claude CLI binary not found.
    #[error("claude CLI not found (searched: {searched})")]
    CliNotFound { searched: String },

    /// Failed to spawn the claude subprocess.
    #[error("failed to spawn claude process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Stream errors
    // -------------------------------------------------------------------------
    /// IO error communicating with the claude subprocess.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    /// The output stream broke after the process started.
    #[error("stream failed: {message}")]
    Stream { message: String },

    // -------------------------------------------------------------------------
    // Session errors
    // -------------------------------------------------------------------------
    /// Query attempted on a closed session.
    #[error("session {id} is closed")]
    SessionClosed { id: String },

    /// No session with this id in the registry.
    #[error("session {id} not found")]
    SessionNotFound { id: String },

    /// An open session with this id already exists.
    #[error("session {id} already exists")]
    SessionExists { id: String },

    // -------------------------------------------------------------------------
    // Cancellation errors
    // -------------------------------------------------------------------------
    /// Request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// Request exceeded the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// A specialized Result type for claude-conduit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Create a stream error from any displayable message.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Check if the caller (or its deadline) ended the request.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::Timeout(_))
    }

    /// Check if this error is retryable.
    ///
    /// Nothing inside the crate retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Io(_) | Error::Stream { .. } | Error::ProcessSpawn(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }

    #[test]
    fn cancellation_is_distinct_from_stream_failure() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(Error::Timeout(Duration::from_secs(1)).is_cancellation());
        assert!(!Error::stream("pipe broke").is_cancellation());
        assert!(!Error::SessionClosed { id: "s".into() }.is_cancellation());
    }

    #[test]
    fn is_retryable_detection() {
        assert!(Error::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(Error::stream("crashed").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::InvalidConfig("bad".into()).is_retryable());
        assert!(!Error::SessionClosed { id: "s".into() }.is_retryable());
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn question_mark_operator_io() {
        fn fallible_io() -> Result<()> {
            let _file = std::fs::File::open("/nonexistent/path/that/does/not/exist")?;
            Ok(())
        }
        assert!(matches!(fallible_io(), Err(Error::Io(_))));
    }

    #[test]
    fn messages_are_human_readable() {
        let err = Error::SessionClosed { id: "abc".into() };
        assert_eq!(err.to_string(), "session abc is closed");
        let err = Error::CliNotFound {
            searched: "claude".into(),
        };
        assert!(err.to_string().contains("claude CLI not found"));
    }
}
