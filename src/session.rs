//! Multi-turn conversation sessions.
//!
//! A [`Session`] is the logical conversation: an id, a working directory, a
//! turn counter and the per-session tool-id state. Each query spawns a fresh
//! CLI process; the session id is passed with `--session-id` on the first
//! launch and `--resume` afterwards so the CLI can restore its context.
//! Whether it actually does is up to the CLI.
//!
//! # Example
//!
//! ```ignore
//! use claude_conduit::{ClientConfig, SessionRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! let registry = SessionRegistry::with_default_launcher();
//! let session = registry.create("review-42")?;
//! let config = ClientConfig::builder().max_turns(3).build()?;
//!
//! let cancel = CancellationToken::new();
//! let first = session.query_collect(&cancel, "Summarise src/lib.rs", &config).await?;
//! let second = session.query_collect(&cancel, "Now list the TODOs", &config).await?;
//! assert_eq!(session.turns(), 2);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{build_args, ClientConfig, Model, SessionId};
use crate::orchestrator::{start_query, QueryJob};
use crate::process::Launcher;
use crate::stream::{CollectedResponse, MessageStream, ToolCallCorrelator};
use crate::{Error, Result};

/// State owned by whichever query currently runs in the session.
///
/// Holding the lock is what serializes queries on one session.
#[derive(Debug, Default)]
pub(crate) struct SessionSlot {
    pub(crate) correlator: ToolCallCorrelator,
    /// Successful process launches so far.
    pub(crate) launches: u64,
}

/// One logical conversation with the CLI.
///
/// # Thread Safety
///
/// `Session` is `Send + Sync` and is shared as `Arc<Session>`. Concurrent
/// queries are serialized: a second query waits until the first finishes or
/// is cancelled.
pub struct Session {
    id: SessionId,
    working_dir: PathBuf,
    model: Option<Model>,
    created_at: DateTime<Utc>,
    turns: AtomicU64,
    closed: CancellationToken,
    slot: Arc<Mutex<SessionSlot>>,
    active_pid: Arc<StdMutex<Option<u32>>>,
    launcher: Arc<dyn Launcher>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("working_dir", &self.working_dir)
            .field("model", &self.model)
            .field("turns", &self.turns())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        working_dir: PathBuf,
        model: Option<Model>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        tracing::debug!(session_id = %id, working_dir = %working_dir.display(), "session created");
        Self {
            id,
            working_dir,
            model,
            created_at: Utc::now(),
            turns: AtomicU64::new(0),
            closed: CancellationToken::new(),
            slot: Arc::new(Mutex::new(SessionSlot::default())),
            active_pid: Arc::new(StdMutex::new(None)),
            launcher,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Queries issued so far. Each accepted query counts as one turn.
    pub fn turns(&self) -> u64 {
        self.turns.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Pid of the process serving the current query, if one is running.
    pub fn active_pid(&self) -> Option<u32> {
        *self.active_pid.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a query and return its message stream immediately.
    ///
    /// Fails synchronously, before any process is spawned, when the session
    /// is closed or `config` is rejected by the argument builder. Everything
    /// after that (spawn failures included) arrives on the stream.
    ///
    /// `config`'s model and working directory override the session's own.
    pub fn query(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        config: &ClientConfig,
    ) -> Result<MessageStream> {
        if self.is_closed() {
            return Err(Error::SessionClosed {
                id: self.id.to_string(),
            });
        }
        build_args(config)?;

        let turn = self.turns.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(session_id = %self.id, turn, "query accepted");

        Ok(start_query(QueryJob {
            session_id: self.id.clone(),
            working_dir: self.working_dir.clone(),
            model: self.model.clone(),
            config: config.clone(),
            prompt: prompt.to_string(),
            launcher: Arc::clone(&self.launcher),
            slot: Arc::clone(&self.slot),
            active_pid: Arc::clone(&self.active_pid),
            caller: cancel.clone(),
            session_closed: self.closed.clone(),
        }))
    }

    /// Run a query to completion and collect its messages.
    pub async fn query_collect(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        config: &ClientConfig,
    ) -> Result<CollectedResponse> {
        self.query(cancel, prompt, config)?.collect_all().await
    }

    /// Close the session. A running query is stopped and its process killed.
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if !self.closed.is_cancelled() {
            tracing::debug!(session_id = %self.id, "session closed");
            self.closed.cancel();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::TokioLauncher;

    fn session(id: &str) -> Session {
        Session::new(
            SessionId::new(id),
            PathBuf::from("."),
            Some(Model::Sonnet),
            Arc::new(TokioLauncher::without_version_check()),
        )
    }

    #[test]
    fn session_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Session>();
    }

    #[test]
    fn new_session_is_open_with_no_turns() {
        let s = session("s1");
        assert_eq!(s.id().as_str(), "s1");
        assert_eq!(s.turns(), 0);
        assert!(!s.is_closed());
        assert!(s.active_pid().is_none());
        assert!(s.created_at() <= Utc::now());
        assert_eq!(s.model(), Some(&Model::Sonnet));
    }

    #[test]
    fn close_is_idempotent() {
        let s = session("s1");
        s.close().unwrap();
        s.close().unwrap();
        assert!(s.is_closed());
    }

    #[test]
    fn query_on_closed_session_fails_immediately() {
        let s = session("s1");
        s.close().unwrap();
        let err = s
            .query(&CancellationToken::new(), "hi", &ClientConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::SessionClosed { ref id } if id == "s1"));
        assert_eq!(s.turns(), 0);
    }

    #[test]
    fn invalid_config_fails_before_spawning() {
        let s = session("s1");
        let config = ClientConfig::builder()
            .permission_mode("everything")
            .build()
            .unwrap();
        let err = s.query(&CancellationToken::new(), "hi", &config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(s.turns(), 0);
    }
}
