use std::sync::Arc;
use std::time::Duration;

use taskhub_auth::{AuthError, CredentialVerifier, Identity};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatch::NotificationDispatcher;
use crate::events::{ClientEvent, ServerEvent};
use crate::notification::{Notification, TaskEvent};
use crate::presence::PresenceTracker;
use crate::registry::{ConnectionRegistry, Session};
use crate::relay::MessageRelay;
use crate::store::{MessageStore, PresenceStore};
use crate::typing::TypingCoordinator;

#[derive(Debug, Clone)]
pub struct HubSettings {
    pub stale_after: Duration,
    pub sweep_interval: Duration,
    pub session_buffer: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            session_buffer: 64,
        }
    }
}

/// Owns the registry and every component that routes through it.
///
/// Transports call [`RealtimeHub::connect`] once per session, feed decoded
/// frames to [`RealtimeHub::handle`] in arrival order and finish with
/// [`RealtimeHub::disconnect`].
pub struct RealtimeHub {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTracker>,
    relay: MessageRelay,
    typing: TypingCoordinator,
    notifications: NotificationDispatcher,
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn PresenceStore>,
    verifier: Arc<dyn CredentialVerifier>,
    settings: HubSettings,
}

impl RealtimeHub {
    pub fn new(
        verifier: Arc<dyn CredentialVerifier>,
        messages: Arc<dyn MessageStore>,
        users: Arc<dyn PresenceStore>,
        settings: HubSettings,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&verifier)));
        let presence = Arc::new(PresenceTracker::new(
            Arc::clone(&registry),
            Arc::clone(&users),
            settings.stale_after,
        ));

        Self {
            relay: MessageRelay::new(
                Arc::clone(&registry),
                Arc::clone(&presence),
                Arc::clone(&messages),
            ),
            typing: TypingCoordinator::new(Arc::clone(&registry), Arc::clone(&presence)),
            notifications: NotificationDispatcher::new(Arc::clone(&registry)),
            registry,
            presence,
            messages,
            users,
            verifier,
            settings,
        }
    }

    /// Verifies a credential without creating a session.
    pub fn authenticate(&self, credential: Option<&str>) -> Result<Identity, AuthError> {
        taskhub_auth::authenticate(self.verifier.as_ref(), credential)
    }

    /// Admits a session and marks its user online. The returned receiver
    /// yields every event routed to the session.
    pub async fn connect(
        &self,
        credential: Option<&str>,
    ) -> Result<(Session, mpsc::Receiver<ServerEvent>), AuthError> {
        let (tx, rx) = mpsc::channel(self.settings.session_buffer.max(1));
        let session = self.registry.admit(tx, credential).await?;
        self.presence.on_connect(&session).await;
        Ok((session, rx))
    }

    /// Same as [`RealtimeHub::connect`] for an identity verified upstream.
    pub async fn connect_identity(
        &self,
        identity: Identity,
    ) -> (Session, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.settings.session_buffer.max(1));
        let session = self.registry.admit_identity(tx, identity).await;
        self.presence.on_connect(&session).await;
        (session, rx)
    }

    pub async fn handle(&self, session: &Session, event: ClientEvent) {
        match event {
            ClientEvent::SendMessage(request) => {
                // Failures are already reported to the session.
                let _ = self.relay.send(session, request).await;
            }
            ClientEvent::Typing(signal) => match signal.receiver_id {
                Some(receiver) if !receiver.is_empty() => {
                    self.typing
                        .set_typing(session.user_id(), &receiver, signal.is_typing)
                        .await;
                }
                _ => debug!(session_id = %session.id, "typing signal without receiver ignored"),
            },
            ClientEvent::Heartbeat => self.presence.on_heartbeat(session.user_id()).await,
        }
    }

    pub async fn disconnect(&self, session: &Session) {
        let remaining = self.registry.evict(session).await;
        if remaining == 0 {
            self.presence.on_disconnect(session.user_id()).await;
        }
        info!(
            user_id = %session.user_id(),
            session_id = %session.id,
            remaining,
            "session disconnected"
        );
    }

    pub async fn dispatch(&self, notification: &Notification) -> usize {
        self.notifications.dispatch(notification).await
    }

    pub async fn publish_task_event(&self, event: &TaskEvent) -> Vec<(Notification, usize)> {
        self.notifications.publish(event).await
    }

    pub fn spawn_presence_sweeper(&self) -> JoinHandle<()> {
        self.presence.spawn_sweeper(self.settings.sweep_interval)
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    pub fn messages(&self) -> &Arc<dyn MessageStore> {
        &self.messages
    }

    pub fn users(&self) -> &Arc<dyn PresenceStore> {
        &self.users
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }
}
