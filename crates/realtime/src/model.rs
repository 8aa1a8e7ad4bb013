use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskhub_auth::{Role, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            _ => None,
        }
    }
}

/// Display fields attached to both ends of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// A persisted chat message with sender and receiver populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender: UserSummary,
    pub receiver: UserSummary,
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// True when the message belongs to the conversation between `a` and `b`.
    pub fn between(&self, a: &UserId, b: &UserId) -> bool {
        (&self.sender.id == a && &self.receiver.id == b)
            || (&self.sender.id == b && &self.receiver.id == a)
    }

    /// The other participant from `me`'s point of view.
    pub fn counterpart(&self, me: &UserId) -> &UserId {
        if &self.sender.id == me {
            &self.receiver.id
        } else {
            &self.sender.id
        }
    }
}

/// What the relay hands to the message store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

/// A user as seen by the chat user listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(id: impl Into<UserId>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            avatar: None,
            role,
            is_online: false,
            last_active: None,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Sorts a user listing most recently active first; never-seen users go last.
pub fn sort_by_recent_activity(users: &mut [UserProfile]) {
    users.sort_by(|a, b| b.last_active.cmp(&a.last_active));
}
