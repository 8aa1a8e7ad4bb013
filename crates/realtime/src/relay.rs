use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::events::{SendMessage, ServerEvent};
use crate::model::{ChatMessage, NewMessage};
use crate::presence::PresenceTracker;
use crate::registry::{ConnectionRegistry, Session};
use crate::store::MessageStore;

/// Persists chat messages and fans them out to both participants.
pub struct MessageRelay {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTracker>,
    store: Arc<dyn MessageStore>,
}

impl MessageRelay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceTracker>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            registry,
            presence,
            store,
        }
    }

    /// Validates, persists and delivers a message sent from `origin`.
    ///
    /// On any failure a `messageError` goes back to `origin` only. The
    /// receiver's sessions get `newMessage`; every session of the sender,
    /// `origin` included, gets `messageConfirmed`.
    pub async fn send(
        &self,
        origin: &Session,
        request: SendMessage,
    ) -> Result<ChatMessage, RelayError> {
        match self.relay(origin, request).await {
            Ok(message) => Ok(message),
            Err(err) => {
                warn!(
                    user_id = %origin.user_id(),
                    session_id = %origin.id,
                    error = %err,
                    "message rejected"
                );
                self.registry
                    .emit_to_session(origin, &ServerEvent::message_error(err.client_message()))
                    .await;
                Err(err)
            }
        }
    }

    async fn relay(
        &self,
        origin: &Session,
        request: SendMessage,
    ) -> Result<ChatMessage, RelayError> {
        let receiver = request
            .receiver_id
            .filter(|receiver| !receiver.is_empty())
            .ok_or_else(|| RelayError::Validation("Receiver is required".to_string()))?;

        if request.content.trim().is_empty() {
            return Err(RelayError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }

        let sender = origin.user_id().clone();
        let now = Utc::now();
        self.presence.touch_at(&sender, now).await;

        let message = self
            .store
            .create_message(NewMessage {
                sender: sender.clone(),
                receiver: receiver.clone(),
                content: request.content,
                message_type: request.message_type,
                created_at: now,
            })
            .await?;

        info!(
            message_id = %message.id,
            sender = %sender,
            receiver = %receiver,
            "created new message"
        );

        let delivered = self
            .registry
            .emit_to_user(&receiver, &ServerEvent::NewMessage(message.clone()))
            .await;
        if delivered == 0 {
            debug!(
                message_id = %message.id,
                receiver = %receiver,
                "receiver offline, message kept for history"
            );
        }

        self.registry
            .emit_to_user(&sender, &ServerEvent::MessageConfirmed(message.clone()))
            .await;

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::model::{MessageType, UserProfile};
    use std::time::Duration;
    use taskhub_auth::{Identity, JwtManager, Role, UserId};
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<ConnectionRegistry>,
        presence: Arc<PresenceTracker>,
        relay: MessageRelay,
        store: MemoryStore,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        store.add_user(UserProfile::new("a", "alice", Role::User)).await;
        store.add_user(UserProfile::new("b", "bob", Role::User)).await;
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(JwtManager::new(
            "relay-test-secret-relay-test",
        ))));
        let presence = Arc::new(PresenceTracker::new(
            Arc::clone(&registry),
            Arc::new(store.clone()),
            Duration::from_secs(300),
        ));
        let relay = MessageRelay::new(
            Arc::clone(&registry),
            Arc::clone(&presence),
            Arc::new(store.clone()),
        );
        Fixture {
            registry,
            presence,
            relay,
            store,
        }
    }

    async fn connect(fx: &Fixture, user: &str) -> (Session, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let session = fx
            .registry
            .admit_identity(tx, Identity::new(user, Role::User))
            .await;
        fx.presence.on_connect(&session).await;
        (session, rx)
    }

    fn settle(receivers: &mut [&mut mpsc::Receiver<ServerEvent>]) {
        for rx in receivers.iter_mut() {
            while rx.try_recv().is_ok() {}
        }
    }

    #[tokio::test]
    async fn delivers_to_receiver_and_confirms_every_sender_session() {
        let fx = fixture().await;
        let (a1, mut rx_a1) = connect(&fx, "a").await;
        let (_a2, mut rx_a2) = connect(&fx, "a").await;
        let (_b, mut rx_b) = connect(&fx, "b").await;
        settle(&mut [&mut rx_a1, &mut rx_a2, &mut rx_b]);

        let message = fx
            .relay
            .send(&a1, SendMessage::text("b", "hi"))
            .await
            .unwrap();

        assert_eq!(rx_b.try_recv().unwrap(), ServerEvent::NewMessage(message.clone()));
        assert_eq!(
            rx_a1.try_recv().unwrap(),
            ServerEvent::MessageConfirmed(message.clone())
        );
        assert_eq!(rx_a2.try_recv().unwrap(), ServerEvent::MessageConfirmed(message));
    }

    #[tokio::test]
    async fn empty_content_reports_error_to_origin_only() {
        let fx = fixture().await;
        let (a1, mut rx_a1) = connect(&fx, "a").await;
        let (_a2, mut rx_a2) = connect(&fx, "a").await;
        let (_b, mut rx_b) = connect(&fx, "b").await;
        settle(&mut [&mut rx_a1, &mut rx_a2, &mut rx_b]);

        let err = fx
            .relay
            .send(&a1, SendMessage::text("b", "   "))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Validation(_)));
        assert!(matches!(rx_a1.try_recv().unwrap(), ServerEvent::MessageError(_)));
        assert!(rx_a2.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
        assert_eq!(fx.store.message_count().await, 0);
    }

    #[tokio::test]
    async fn missing_receiver_is_a_validation_error() {
        let fx = fixture().await;
        let (a, _rx) = connect(&fx, "a").await;

        let err = fx
            .relay
            .send(
                &a,
                SendMessage {
                    receiver_id: None,
                    content: "hi".to_string(),
                    message_type: MessageType::Text,
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err, RelayError::Validation("Receiver is required".to_string()));
    }

    #[tokio::test]
    async fn unknown_receiver_is_never_delivered() {
        let fx = fixture().await;
        let (a, mut rx_a) = connect(&fx, "a").await;

        let err = fx
            .relay
            .send(&a, SendMessage::text("ghost", "hi"))
            .await
            .unwrap_err();

        assert_eq!(err, RelayError::UnknownReceiver);
        assert_eq!(
            rx_a.try_recv().unwrap(),
            ServerEvent::message_error("Receiver not found")
        );
        assert_eq!(fx.store.message_count().await, 0);
    }

    #[tokio::test]
    async fn offline_receiver_still_gets_history() {
        let fx = fixture().await;
        let (a, mut rx_a) = connect(&fx, "a").await;

        fx.relay
            .send(&a, SendMessage::text("b", "hi"))
            .await
            .unwrap();
        assert!(matches!(
            rx_a.try_recv().unwrap(),
            ServerEvent::MessageConfirmed(_)
        ));

        let history = fx
            .store
            .find_conversation(&UserId::from("b"), &UserId::from("a"))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hi");
    }
}
