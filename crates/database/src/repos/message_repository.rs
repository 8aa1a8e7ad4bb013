//! Repository for chat message persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use taskhub_realtime::{
    ChatMessage, MessageStore, MessageType, NewMessage, StoreResult, UserId, UserSummary,
};
use tracing::info;

use crate::repos::UserRepository;
use crate::types::{
    decode_optional_timestamp, decode_timestamp, encode_timestamp, DatabaseError, DatabaseResult,
};

const SELECT_POPULATED: &str = "
    SELECT m.id, m.content, m.message_type, m.is_read, m.read_at, m.created_at,
           s.id AS sender_id, s.username AS sender_username, s.avatar AS sender_avatar,
           r.id AS receiver_id, r.username AS receiver_username, r.avatar AS receiver_avatar
    FROM messages m
    JOIN users s ON s.id = m.sender_id
    JOIN users r ON r.id = m.receiver_id";

#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
    users: UserRepository,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            pool,
        }
    }

    /// Stores a message after checking both participants exist.
    pub async fn create(&self, message: &NewMessage) -> DatabaseResult<ChatMessage> {
        let sender = self
            .users
            .find_summary(&message.sender)
            .await?
            .ok_or_else(|| DatabaseError::UserNotFound(message.sender.to_string()))?;
        let receiver = self
            .users
            .find_summary(&message.receiver)
            .await?
            .ok_or_else(|| DatabaseError::ReceiverNotFound(message.receiver.to_string()))?;

        let id = cuid2::create_id();
        sqlx::query(
            "INSERT INTO messages (id, sender_id, receiver_id, content, message_type, is_read, read_at, created_at)
             VALUES (?, ?, ?, ?, ?, 0, NULL, ?)",
        )
        .bind(&id)
        .bind(message.sender.as_str())
        .bind(message.receiver.as_str())
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(encode_timestamp(message.created_at))
        .execute(&self.pool)
        .await?;

        info!(
            message_id = %id,
            sender_id = %message.sender,
            receiver_id = %message.receiver,
            "created new message"
        );

        Ok(ChatMessage {
            id,
            sender,
            receiver,
            content: message.content.clone(),
            message_type: message.message_type,
            is_read: false,
            read_at: None,
            created_at: message.created_at,
        })
    }

    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<ChatMessage>> {
        let query = format!("{SELECT_POPULATED} WHERE m.id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    /// Messages in both directions between `a` and `b`, oldest first.
    pub async fn find_conversation(&self, a: &UserId, b: &UserId) -> DatabaseResult<Vec<ChatMessage>> {
        let query = format!(
            "{SELECT_POPULATED}
             WHERE (m.sender_id = ? AND m.receiver_id = ?)
                OR (m.sender_id = ? AND m.receiver_id = ?)
             ORDER BY m.created_at ASC, m.rowid ASC"
        );
        let rows = sqlx::query(&query)
            .bind(a.as_str())
            .bind(b.as_str())
            .bind(b.as_str())
            .bind(a.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(message_from_row).collect()
    }

    pub async fn mark_read(
        &self,
        sender: &UserId,
        receiver: &UserId,
        at: DateTime<Utc>,
    ) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1, read_at = ?
             WHERE sender_id = ? AND receiver_id = ? AND is_read = 0",
        )
        .bind(encode_timestamp(at))
        .bind(sender.as_str())
        .bind(receiver.as_str())
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected();
        if updated > 0 {
            info!(sender_id = %sender, receiver_id = %receiver, updated, "messages marked read");
        }
        Ok(updated)
    }

    pub async fn unread_count(&self, receiver: &UserId) -> DatabaseResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE receiver_id = ? AND is_read = 0")
                .bind(receiver.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn message_from_row(row: &SqliteRow) -> DatabaseResult<ChatMessage> {
    let message_type: String = row.try_get("message_type")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ChatMessage {
        id: row.try_get("id")?,
        sender: UserSummary {
            id: UserId::new(row.try_get::<String, _>("sender_id")?),
            username: row.try_get("sender_username")?,
            avatar: row.try_get("sender_avatar")?,
        },
        receiver: UserSummary {
            id: UserId::new(row.try_get::<String, _>("receiver_id")?),
            username: row.try_get("receiver_username")?,
            avatar: row.try_get("receiver_avatar")?,
        },
        content: row.try_get("content")?,
        message_type: MessageType::parse(&message_type).ok_or_else(|| {
            DatabaseError::InvalidRow(format!("unknown message type {message_type:?}"))
        })?,
        is_read: row.try_get("is_read")?,
        read_at: decode_optional_timestamp(row.try_get("read_at")?)?,
        created_at: decode_timestamp(&created_at)?,
    })
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn create_message(&self, message: NewMessage) -> StoreResult<ChatMessage> {
        Ok(self.create(&message).await?)
    }

    async fn find_conversation(&self, a: &UserId, b: &UserId) -> StoreResult<Vec<ChatMessage>> {
        Ok(MessageRepository::find_conversation(self, a, b).await?)
    }

    async fn mark_read(
        &self,
        sender: &UserId,
        receiver: &UserId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        Ok(MessageRepository::mark_read(self, sender, receiver, at).await?)
    }

    async fn unread_count(&self, receiver: &UserId) -> StoreResult<u64> {
        Ok(MessageRepository::unread_count(self, receiver).await?)
    }
}
