use std::sync::Arc;

use taskhub_auth::UserId;
use tracing::debug;

use crate::events::{ServerEvent, TypingNotice};
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;

/// Forwards ephemeral typing state between two users. Nothing is stored and
/// nothing is acknowledged.
pub struct TypingCoordinator {
    registry: Arc<ConnectionRegistry>,
    presence: Arc<PresenceTracker>,
}

impl TypingCoordinator {
    pub fn new(registry: Arc<ConnectionRegistry>, presence: Arc<PresenceTracker>) -> Self {
        Self { registry, presence }
    }

    /// Returns the number of receiver sessions that got the notice.
    pub async fn set_typing(&self, sender: &UserId, receiver: &UserId, is_typing: bool) -> usize {
        self.presence.on_heartbeat(sender).await;

        let notice = ServerEvent::UserTyping(TypingNotice {
            user_id: sender.clone(),
            is_typing,
        });
        let delivered = self.registry.emit_to_user(receiver, &notice).await;
        if delivered == 0 {
            debug!(sender = %sender, receiver = %receiver, "typing notice dropped, receiver offline");
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::time::Duration;
    use taskhub_auth::{Identity, JwtManager, Role};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn relays_to_receiver_and_drops_when_offline() {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(JwtManager::new(
            "typing-test-secret-typing-test",
        ))));
        let presence = Arc::new(PresenceTracker::new(
            Arc::clone(&registry),
            store,
            Duration::from_secs(300),
        ));
        let typing = TypingCoordinator::new(Arc::clone(&registry), Arc::clone(&presence));

        let a = UserId::from("a");
        let b = UserId::from("b");
        assert_eq!(typing.set_typing(&a, &b, true).await, 0);

        let (tx, mut rx) = mpsc::channel(4);
        let session = registry
            .admit_identity(tx, Identity::new("b", Role::User))
            .await;
        presence.on_connect(&session).await;

        assert_eq!(typing.set_typing(&a, &b, true).await, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::UserTyping(TypingNotice {
                user_id: a,
                is_typing: true
            })
        );
    }
}
