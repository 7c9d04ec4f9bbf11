//! Per-caller conversational state.
//!
//! Each session holds the last reply and the audio artifact synthesized for
//! it. Sessions are created lazily and only disappear through
//! [`SessionStore::evict_overflow`], which removes the oldest-created
//! sessions first regardless of how recently they were used.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use voicehook_types::{ArtifactRef, Reply, SessionId};

/// An artifact together with the text it was synthesized from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpokenArtifact {
    pub artifact: ArtifactRef,
    pub text: String,
}

/// State of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub reply: Option<Reply>,
    pub artifact: Option<SpokenArtifact>,
}

/// Outcome of recording an artifact on a session.
#[derive(Debug, PartialEq, Eq)]
pub enum ArtifactUpdate {
    /// The artifact is now the session's current one. Carries the artifact it
    /// replaced, which the caller must release.
    Stored { superseded: Option<ArtifactRef> },
    /// The session already holds audio for the same reply text. `existing`
    /// stays current and `discarded` must be released.
    Kept {
        existing: ArtifactRef,
        discarded: ArtifactRef,
    },
    /// The session's reply changed (or the session is gone) since synthesis
    /// started. The artifact was not stored and must be released.
    Stale(ArtifactRef),
}

#[derive(Debug, Default)]
struct SessionTable {
    entries: HashMap<SessionId, SessionState>,
    /// Session ids in creation order, oldest first.
    order: VecDeque<SessionId>,
}

impl SessionTable {
    fn entry(&mut self, id: &SessionId) -> &mut SessionState {
        if !self.entries.contains_key(id) {
            self.order.push_back(id.clone());
            tracing::info!(session = %id, "created session");
        }
        self.entries.entry(id.clone()).or_default()
    }
}

/// Thread-safe map from session id to session state.
///
/// Uses `std::sync::RwLock`: every lock acquisition is a short map operation
/// that never spans an `.await`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    table: Arc<RwLock<SessionTable>>,
    max_sessions: usize,
}

impl SessionStore {
    /// Creates an empty store bounded to `max_sessions` (at least one).
    pub fn new(max_sessions: usize) -> Self {
        Self {
            table: Arc::new(RwLock::new(SessionTable::default())),
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionTable> {
        self.table.read().unwrap_or_else(|poisoned| {
            tracing::error!("session table lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionTable> {
        self.table.write().unwrap_or_else(|poisoned| {
            tracing::error!("session table lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Returns the session for `token`, creating it if unknown.
    ///
    /// A missing or malformed token yields a freshly minted id.
    pub fn resolve(&self, token: Option<&str>) -> SessionId {
        let id = token
            .and_then(SessionId::parse)
            .unwrap_or_else(SessionId::generate);
        self.write().entry(&id);
        id
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.read().entries.contains_key(id)
    }

    /// Returns a copy of the session's state, if the session exists.
    pub fn snapshot(&self, id: &SessionId) -> Option<SessionState> {
        self.read().entries.get(id).cloned()
    }

    pub fn get_reply(&self, id: &SessionId) -> Option<Reply> {
        self.read().entries.get(id).and_then(|s| s.reply.clone())
    }

    /// Stores `reply` on an existing session.
    ///
    /// Returns false when the session is gone; evicted sessions are never
    /// recreated here.
    pub fn set_reply(&self, id: &SessionId, reply: Reply) -> bool {
        match self.write().entries.get_mut(id) {
            Some(state) => {
                state.reply = Some(reply);
                tracing::debug!(session = %id, "updated session reply");
                true
            }
            None => {
                tracing::debug!(session = %id, "session gone, reply not stored");
                false
            }
        }
    }

    /// Returns the session's most recently recorded artifact.
    pub fn get_artifact(&self, id: &SessionId) -> Option<ArtifactRef> {
        self.read()
            .entries
            .get(id)
            .and_then(|s| s.artifact.as_ref())
            .map(|spoken| spoken.artifact.clone())
    }

    /// Returns the session's artifact only if it was synthesized from the
    /// current reply text.
    pub fn get_current_artifact(&self, id: &SessionId) -> Option<ArtifactRef> {
        let table = self.read();
        let state = table.entries.get(id)?;
        let reply = state.reply.as_ref()?;
        state
            .artifact
            .as_ref()
            .filter(|spoken| spoken.text == reply.text)
            .map(|spoken| spoken.artifact.clone())
    }

    /// Records `artifact` as the session's audio for `text`, replacing
    /// whatever was recorded before.
    ///
    /// A session that is gone yields [`ArtifactUpdate::Stale`].
    pub fn set_artifact(
        &self,
        id: &SessionId,
        artifact: ArtifactRef,
        text: impl Into<String>,
    ) -> ArtifactUpdate {
        let mut table = self.write();
        let Some(state) = table.entries.get_mut(id) else {
            return ArtifactUpdate::Stale(artifact);
        };
        let previous = state.artifact.replace(SpokenArtifact {
            artifact: artifact.clone(),
            text: text.into(),
        });
        tracing::debug!(session = %id, filename = artifact.filename(), "updated session artifact");
        ArtifactUpdate::Stored {
            superseded: previous.map(|p| p.artifact).filter(|p| *p != artifact),
        }
    }

    /// Records `artifact` only if the session still exists, its reply is
    /// still `text` and it holds no audio for that text yet.
    ///
    /// An artifact already recorded for `text` wins, so a URL handed out for
    /// it keeps resolving.
    pub fn set_artifact_if_current(
        &self,
        id: &SessionId,
        artifact: ArtifactRef,
        text: &str,
    ) -> ArtifactUpdate {
        let mut table = self.write();
        let Some(state) = table.entries.get_mut(id) else {
            return ArtifactUpdate::Stale(artifact);
        };
        if state.reply.as_ref().map(|r| r.text.as_str()) != Some(text) {
            return ArtifactUpdate::Stale(artifact);
        }
        if let Some(spoken) = state.artifact.as_ref().filter(|s| s.text == text) {
            if spoken.artifact != artifact {
                return ArtifactUpdate::Kept {
                    existing: spoken.artifact.clone(),
                    discarded: artifact,
                };
            }
        }
        let previous = state.artifact.replace(SpokenArtifact {
            artifact: artifact.clone(),
            text: text.to_string(),
        });
        ArtifactUpdate::Stored {
            superseded: previous.map(|p| p.artifact).filter(|p| *p != artifact),
        }
    }

    /// Forgets the session's artifact if it is still `artifact`.
    ///
    /// Returns whether anything was removed.
    pub fn discard_artifact(&self, id: &SessionId, artifact: &ArtifactRef) -> bool {
        let mut table = self.write();
        let Some(state) = table.entries.get_mut(id) else {
            return false;
        };
        if state.artifact.as_ref().map(|s| &s.artifact) == Some(artifact) {
            state.artifact = None;
            true
        } else {
            false
        }
    }

    /// Filenames of every artifact currently referenced by a session.
    pub fn artifact_filenames(&self) -> HashSet<String> {
        self.read()
            .entries
            .values()
            .filter_map(|s| s.artifact.as_ref())
            .map(|spoken| spoken.artifact.filename().to_string())
            .collect()
    }

    /// Removes the oldest-created sessions until at most `max_sessions`
    /// remain. Returns the removed sessions' states so their artifacts can be
    /// released.
    pub fn evict_overflow(&self, max_sessions: usize) -> Vec<SessionState> {
        let mut table = self.write();
        let mut evicted = Vec::new();
        while table.entries.len() > max_sessions {
            let Some(oldest) = table.order.pop_front() else {
                break;
            };
            if let Some(state) = table.entries.remove(&oldest) {
                evicted.push(state);
            }
        }
        if !evicted.is_empty() {
            tracing::info!(
                count = evicted.len(),
                remaining = table.entries.len(),
                "evicted oldest sessions"
            );
        }
        evicted
    }
}
