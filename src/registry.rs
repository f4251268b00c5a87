//! The set of live sessions, keyed by id.
//!
//! A registry is an ordinary value: create one at startup, share it as
//! `Arc<SessionRegistry>`, and call [`shutdown`](SessionRegistry::shutdown)
//! when done. Independent registries never interact.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{ClientConfig, SessionId};
use crate::process::{Launcher, TokioLauncher};
use crate::session::Session;
use crate::{Error, Result};

/// Thread-safe map of sessions.
///
/// The lock guards map lookups and updates only; it is never held while a
/// process runs.
pub struct SessionRegistry {
    launcher: Arc<dyn Launcher>,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.list())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// A registry whose sessions launch processes through `launcher`.
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// A registry that spawns the real CLI.
    pub fn with_default_launcher() -> Self {
        Self::new(Arc::new(TokioLauncher::new()))
    }

    /// Create a session in the current directory.
    ///
    /// Fails if an open session with this id exists. A closed one is
    /// replaced.
    pub fn create(&self, id: impl Into<SessionId>) -> Result<Arc<Session>> {
        self.create_with(id, &ClientConfig::default())
    }

    /// Create a session taking its model and working directory from `config`.
    pub fn create_with(&self, id: impl Into<SessionId>, config: &ClientConfig) -> Result<Arc<Session>> {
        let id = id.into();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = sessions.get(&id) {
            if !existing.is_closed() {
                return Err(Error::SessionExists { id: id.to_string() });
            }
        }

        let session = Arc::new(self.new_session(id.clone(), config));
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Create a session under a fresh random id.
    pub fn create_generated(&self) -> Result<Arc<Session>> {
        self.create(SessionId::generate())
    }

    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SessionNotFound { id: id.to_string() })
    }

    /// The open session with this id, creating it if absent or closed.
    pub fn get_or_create(&self, id: impl Into<SessionId>) -> Result<Arc<Session>> {
        self.get_or_create_with(id, &ClientConfig::default())
    }

    pub fn get_or_create_with(
        &self,
        id: impl Into<SessionId>,
        config: &ClientConfig,
    ) -> Result<Arc<Session>> {
        let id = id.into();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = sessions.get(&id) {
            if !existing.is_closed() {
                return Ok(Arc::clone(existing));
            }
        }

        let session = Arc::new(self.new_session(id.clone(), config));
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Session ids in lexicographic order.
    pub fn list(&self) -> Vec<SessionId> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<SessionId> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close a session and evict it.
    pub fn remove(&self, id: &SessionId) -> Result<()> {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(session) => session.close(),
            None => Err(Error::SessionNotFound { id: id.to_string() }),
        }
    }

    /// Close and evict every session.
    pub fn shutdown(&self) {
        let drained: Vec<Arc<Session>> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, session)| session)
            .collect();
        tracing::debug!(sessions = drained.len(), "registry shutdown");
        for session in drained {
            let _ = session.close();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn new_session(&self, id: SessionId, config: &ClientConfig) -> Session {
        let working_dir = config
            .working_directory()
            .cloned()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Session::new(
            id,
            working_dir,
            config.model().cloned(),
            Arc::clone(&self.launcher),
        )
    }
}
