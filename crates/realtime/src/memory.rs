//! In-memory stores for tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskhub_auth::UserId;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::model::{sort_by_recent_activity, ChatMessage, NewMessage, UserProfile};
use crate::store::{MessageStore, PresenceStore};

#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<UserId, UserProfile>>>,
    messages: Arc<RwLock<Vec<ChatMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, profile: UserProfile) {
        let mut users = self.users.write().await;
        users.insert(profile.id.clone(), profile);
    }

    pub async fn user(&self, id: &UserId) -> Option<UserProfile> {
        self.users.read().await.get(id).cloned()
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, message: NewMessage) -> StoreResult<ChatMessage> {
        let (sender, receiver) = {
            let users = self.users.read().await;
            let sender = users
                .get(&message.sender)
                .ok_or_else(|| StoreError::UserNotFound(message.sender.to_string()))?;
            let receiver = users
                .get(&message.receiver)
                .ok_or_else(|| StoreError::ReceiverNotFound(message.receiver.to_string()))?;
            (sender.summary(), receiver.summary())
        };

        let stored = ChatMessage {
            id: cuid2::create_id(),
            sender,
            receiver,
            content: message.content,
            message_type: message.message_type,
            is_read: false,
            read_at: None,
            created_at: message.created_at,
        };

        self.messages.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn find_conversation(&self, a: &UserId, b: &UserId) -> StoreResult<Vec<ChatMessage>> {
        let messages = self.messages.read().await;
        let mut conversation: Vec<ChatMessage> = messages
            .iter()
            .filter(|message| message.between(a, b))
            .cloned()
            .collect();
        conversation.sort_by_key(|message| message.created_at);
        Ok(conversation)
    }

    async fn mark_read(
        &self,
        sender: &UserId,
        receiver: &UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut messages = self.messages.write().await;
        let mut updated = 0;
        for message in messages.iter_mut().filter(|message| {
            &message.sender.id == sender && &message.receiver.id == receiver && !message.is_read
        }) {
            message.is_read = true;
            message.read_at = Some(at);
            updated += 1;
        }
        Ok(updated)
    }

    async fn unread_count(&self, receiver: &UserId) -> StoreResult<u64> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|message| &message.receiver.id == receiver && !message.is_read)
            .count() as u64)
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn set_presence(
        &self,
        user: &UserId,
        online: bool,
        last_active: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let profile = users
            .get_mut(user)
            .ok_or_else(|| StoreError::UserNotFound(user.to_string()))?;
        profile.is_online = online;
        profile.last_active = Some(last_active);
        Ok(())
    }

    async fn touch_last_active(&self, user: &UserId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let profile = users
            .get_mut(user)
            .ok_or_else(|| StoreError::UserNotFound(user.to_string()))?;
        profile.last_active = Some(at);
        Ok(())
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        let mut users: Vec<UserProfile> = self.users.read().await.values().cloned().collect();
        sort_by_recent_activity(&mut users);
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;
    use chrono::Duration;
    use taskhub_auth::Role;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_user(UserProfile::new("a", "alice", Role::Admin)).await;
        store.add_user(UserProfile::new("b", "bob", Role::User)).await;
        store
    }

    fn new_message(from: &str, to: &str, content: &str, at: DateTime<Utc>) -> NewMessage {
        NewMessage {
            sender: UserId::from(from),
            receiver: UserId::from(to),
            content: content.to_string(),
            message_type: MessageType::Text,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn create_populates_both_ends() {
        let store = seeded().await;
        let message = store
            .create_message(new_message("a", "b", "hi", Utc::now()))
            .await
            .unwrap();

        assert_eq!(message.sender.username, "alice");
        assert_eq!(message.receiver.username, "bob");
        assert!(!message.is_read);
    }

    #[tokio::test]
    async fn unknown_receiver_is_distinguished() {
        let store = seeded().await;
        let err = store
            .create_message(new_message("a", "ghost", "hi", Utc::now()))
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::ReceiverNotFound("ghost".to_string()));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn conversation_is_sorted_and_mark_read_is_directional() {
        let store = seeded().await;
        let t0 = Utc::now();
        store
            .create_message(new_message("b", "a", "second", t0 + Duration::seconds(2)))
            .await
            .unwrap();
        store
            .create_message(new_message("a", "b", "first", t0))
            .await
            .unwrap();

        let conversation = store
            .find_conversation(&UserId::from("b"), &UserId::from("a"))
            .await
            .unwrap();
        let contents: Vec<_> = conversation.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);

        assert_eq!(store.unread_count(&UserId::from("a")).await.unwrap(), 1);
        let updated = store
            .mark_read(&UserId::from("b"), &UserId::from("a"), Utc::now())
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.unread_count(&UserId::from("a")).await.unwrap(), 0);
        assert_eq!(store.unread_count(&UserId::from("b")).await.unwrap(), 1);
    }
}
