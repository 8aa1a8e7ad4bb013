//! Live sessions grouped by the user that owns them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use taskhub_auth::{authenticate, AuthError, CredentialVerifier, Identity, UserId};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::ServerEvent;

/// Outbound half of a session's transport.
pub type SessionSink = mpsc::Sender<ServerEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An authenticated transport connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub identity: Identity,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }
}

struct SessionEntry {
    session: Session,
    sink: SessionSink,
}

impl SessionEntry {
    fn deliver(&self, event: &ServerEvent) -> bool {
        match self.sink.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    session_id = %self.session.id,
                    user_id = %self.session.identity.user_id,
                    event = event.name(),
                    "session outbound buffer full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(
                    session_id = %self.session.id,
                    event = event.name(),
                    "session already closed, dropping event"
                );
                false
            }
        }
    }
}

/// Maps each user to the set of their live sessions.
pub struct ConnectionRegistry {
    verifier: Arc<dyn CredentialVerifier>,
    channels: RwLock<HashMap<UserId, HashMap<SessionId, SessionEntry>>>,
}

impl ConnectionRegistry {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            verifier,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Verifies `credential` and, only if it is valid, registers a session
    /// that delivers through `sink`.
    pub async fn admit(
        &self,
        sink: SessionSink,
        credential: Option<&str>,
    ) -> Result<Session, AuthError> {
        let identity = authenticate(self.verifier.as_ref(), credential)?;
        Ok(self.admit_identity(sink, identity).await)
    }

    /// Registers a session for an identity that was verified elsewhere.
    pub async fn admit_identity(&self, sink: SessionSink, identity: Identity) -> Session {
        let session = Session {
            id: SessionId::new(),
            identity,
            connected_at: Utc::now(),
        };

        let mut channels = self.channels.write().await;
        let user_sessions = channels.entry(session.user_id().clone()).or_default();
        user_sessions.insert(
            session.id,
            SessionEntry {
                session: session.clone(),
                sink,
            },
        );

        info!(
            user_id = %session.user_id(),
            session_id = %session.id,
            sessions = user_sessions.len(),
            "session admitted"
        );
        session
    }

    /// Removes the session and returns how many sessions the user still has.
    pub async fn evict(&self, session: &Session) -> usize {
        let mut channels = self.channels.write().await;
        let Some(user_sessions) = channels.get_mut(session.user_id()) else {
            return 0;
        };

        if user_sessions.remove(&session.id).is_some() {
            info!(
                user_id = %session.user_id(),
                session_id = %session.id,
                remaining = user_sessions.len(),
                "session evicted"
            );
        }

        let remaining = user_sessions.len();
        if remaining == 0 {
            channels.remove(session.user_id());
        }
        remaining
    }

    pub async fn sessions_for(&self, user: &UserId) -> Vec<Session> {
        let channels = self.channels.read().await;
        channels
            .get(user)
            .map(|sessions| sessions.values().map(|entry| entry.session.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn session_count(&self, user: &UserId) -> usize {
        let channels = self.channels.read().await;
        channels.get(user).map_or(0, HashMap::len)
    }

    pub async fn find_session(&self, id: SessionId) -> Option<Session> {
        let channels = self.channels.read().await;
        channels
            .values()
            .find_map(|sessions| sessions.get(&id).map(|entry| entry.session.clone()))
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Number of connected users and the total number of sessions.
    pub async fn totals(&self) -> (usize, usize) {
        let channels = self.channels.read().await;
        let sessions = channels.values().map(HashMap::len).sum();
        (channels.len(), sessions)
    }

    /// Sends `event` to every session of `user`; returns how many accepted it.
    pub async fn emit_to_user(&self, user: &UserId, event: &ServerEvent) -> usize {
        let channels = self.channels.read().await;
        channels.get(user).map_or(0, |sessions| {
            sessions.values().filter(|entry| entry.deliver(event)).count()
        })
    }

    pub async fn emit_to_session(&self, session: &Session, event: &ServerEvent) -> bool {
        let channels = self.channels.read().await;
        channels
            .get(session.user_id())
            .and_then(|sessions| sessions.get(&session.id))
            .is_some_and(|entry| entry.deliver(event))
    }

    /// Sends `event` to every live session except `except`.
    pub async fn broadcast(&self, event: &ServerEvent, except: Option<SessionId>) -> usize {
        let channels = self.channels.read().await;
        channels
            .values()
            .flat_map(HashMap::values)
            .filter(|entry| Some(entry.session.id) != except)
            .filter(|entry| entry.deliver(event))
            .count()
    }
}
