//! Storage collaborators consumed by the socket layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskhub_auth::UserId;

use crate::error::StoreResult;
use crate::model::{ChatMessage, NewMessage, UserProfile};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message and returns it with sender and receiver populated.
    /// Fails with `ReceiverNotFound` when the receiver does not exist.
    async fn create_message(&self, message: NewMessage) -> StoreResult<ChatMessage>;

    /// Both directions of the conversation, oldest first.
    async fn find_conversation(&self, a: &UserId, b: &UserId) -> StoreResult<Vec<ChatMessage>>;

    /// Marks every unread message from `sender` to `receiver` as read.
    async fn mark_read(
        &self,
        sender: &UserId,
        receiver: &UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn unread_count(&self, receiver: &UserId) -> StoreResult<u64>;
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn set_presence(
        &self,
        user: &UserId,
        online: bool,
        last_active: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn touch_last_active(&self, user: &UserId, at: DateTime<Utc>) -> StoreResult<()>;

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>>;
}
