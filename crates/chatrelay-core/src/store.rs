//! Session-scoped transcript registry.
//!
//! Each session id owns a dedicated [`Transcript`]; concurrent sessions never
//! write into each other's conversation.  The store lives in process memory
//! only and grows with every session and message; there is no eviction.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::RelayError;
use crate::transcript::{Message, Transcript};

/// Identifier of one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(SessionId)
            .map_err(|_| RelayError::Validation(format!("invalid session id: {s:?}")))
    }
}

/// Registry of per-session transcripts.
#[derive(Debug)]
pub struct TranscriptStore {
    system_prompt: String,
    sessions: RwLock<HashMap<SessionId, Transcript>>,
}

impl TranscriptStore {
    /// Create an empty store; every new session is seeded with `system_prompt`.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Start a new session and return its id.
    pub async fn create(&self) -> SessionId {
        let id = SessionId::new();
        self.open(&id).await;
        id
    }

    /// Get-or-create the transcript for a caller-supplied id.
    ///
    /// Returns `true` when the session was newly created.
    pub async fn open(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            return false;
        }
        sessions.insert(*id, Transcript::new(self.system_prompt.clone()));
        debug!(session_id = %id, "transcript created");
        true
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Append `message` to the end of the session's transcript.
    pub async fn append(&self, id: &SessionId, message: Message) -> Result<(), RelayError> {
        let mut sessions = self.sessions.write().await;
        let transcript = sessions
            .get_mut(id)
            .ok_or_else(|| RelayError::UnknownSession(id.to_string()))?;
        transcript.append(message);
        Ok(())
    }

    /// Full ordered copy of the session's transcript.
    pub async fn snapshot(&self, id: &SessionId) -> Result<Vec<Message>, RelayError> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(Transcript::snapshot)
            .ok_or_else(|| RelayError::UnknownSession(id.to_string()))
    }

    pub async fn len(&self, id: &SessionId) -> Result<usize, RelayError> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(Transcript::len)
            .ok_or_else(|| RelayError::UnknownSession(id.to_string()))
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
