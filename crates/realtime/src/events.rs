//! Wire protocol. Every frame is `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use taskhub_auth::UserId;

use crate::model::{ChatMessage, MessageType};
use crate::notification::Notification;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

impl SendMessage {
    pub fn text(receiver: impl Into<UserId>, content: impl Into<String>) -> Self {
        Self {
            receiver_id: Some(receiver.into()),
            content: content.into(),
            message_type: MessageType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    SendMessage(SendMessage),
    Typing(TypingSignal),
    Heartbeat,
}

impl ClientEvent {
    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageError {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub user_id: UserId,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(ChatMessage),
    MessageConfirmed(ChatMessage),
    MessageError(MessageError),
    UserOnline(UserId),
    UserOffline(UserId),
    UserTyping(TypingNotice),
    TaskNotification(Notification),
}

impl ServerEvent {
    pub fn message_error(error: impl Into<String>) -> Self {
        ServerEvent::MessageError(MessageError {
            error: error.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::MessageConfirmed(_) => "messageConfirmed",
            ServerEvent::MessageError(_) => "messageError",
            ServerEvent::UserOnline(_) => "userOnline",
            ServerEvent::UserOffline(_) => "userOffline",
            ServerEvent::UserTyping(_) => "userTyping",
            ServerEvent::TaskNotification(_) => "taskNotification",
        }
    }

    pub fn from_frame(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_message_defaults_to_text() {
        let event = ClientEvent::from_frame(
            r#"{"event":"sendMessage","data":{"receiverId":"u-2","content":"hi"}}"#,
        )
        .unwrap();

        assert_eq!(event, ClientEvent::SendMessage(SendMessage::text("u-2", "hi")));
    }

    #[test]
    fn send_message_without_receiver_still_parses() {
        let event =
            ClientEvent::from_frame(r#"{"event":"sendMessage","data":{"content":"hi"}}"#).unwrap();

        match event {
            ClientEvent::SendMessage(payload) => assert!(payload.receiver_id.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn heartbeat_needs_no_data() {
        assert_eq!(
            ClientEvent::from_frame(r#"{"event":"heartbeat"}"#).unwrap(),
            ClientEvent::Heartbeat
        );
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(ClientEvent::from_frame(r#"{"event":"joinRoom","data":{}}"#).is_err());
    }

    #[test]
    fn presence_events_carry_bare_user_id() {
        let frame = ServerEvent::UserOffline(UserId::from("u-3")).to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"event": "userOffline", "data": "u-3"}));
    }

    #[test]
    fn typing_notice_uses_camel_case() {
        let frame = ServerEvent::UserTyping(TypingNotice {
            user_id: UserId::from("u-1"),
            is_typing: true,
        })
        .to_frame()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"event": "userTyping", "data": {"userId": "u-1", "isTyping": true}})
        );
    }

    #[test]
    fn message_error_shape() {
        let value = serde_json::to_value(ServerEvent::message_error("Receiver not found")).unwrap();
        assert_eq!(
            value,
            json!({"event": "messageError", "data": {"error": "Receiver not found"}})
        );
    }
}
