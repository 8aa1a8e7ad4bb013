//! Per-conversation message lists that merge history, optimistic sends and
//! server echoes.
//!
//! Echoes are matched to optimistic entries by sender, receiver, content and
//! a time window. Two identical messages sent within the window can be
//! matched to each other's entry; the list still ends up with one entry per
//! persisted id. A persisted message absorbs at most one `Sending` entry,
//! the earliest, and never a `Failed` one.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use taskhub_realtime::{ChatMessage, MessageType, SendMessage, UserId};

use crate::config::{chrono_duration, ClientConfig};

const TEMP_PREFIX: &str = "temp_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationEntry {
    pub id: String,
    pub sender: UserId,
    pub receiver: UserId,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// The persisted message once the server has it.
    pub message: Option<ChatMessage>,
}

impl ConversationEntry {
    fn persisted(message: &ChatMessage) -> Self {
        Self {
            id: message.id.clone(),
            sender: message.sender.id.clone(),
            receiver: message.receiver.id.clone(),
            content: message.content.clone(),
            message_type: message.message_type,
            created_at: message.created_at,
            status: DeliveryStatus::Confirmed,
            message: Some(message.clone()),
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.id.starts_with(TEMP_PREFIX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// An optimistic entry was swapped for the persisted message.
    Replaced,
    Appended,
    /// The persisted id was already present.
    Duplicate,
    /// The message does not involve this user.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ConversationStore {
    me: UserId,
    echo_window: chrono::Duration,
    confirm_timeout: chrono::Duration,
    conversations: HashMap<UserId, Vec<ConversationEntry>>,
}

impl ConversationStore {
    pub fn new(me: UserId, config: &ClientConfig) -> Self {
        Self {
            me,
            echo_window: chrono_duration(config.echo_match_window),
            confirm_timeout: chrono_duration(config.confirm_timeout),
            conversations: HashMap::new(),
        }
    }

    pub fn conversation(&self, other: &UserId) -> &[ConversationEntry] {
        self.conversations
            .get(other)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Appends a `Sending` entry for a message about to be sent and returns
    /// its temporary id with the request to put on the wire.
    pub fn send_intent(
        &mut self,
        receiver: &UserId,
        content: impl Into<String>,
        message_type: MessageType,
        now: DateTime<Utc>,
    ) -> (String, SendMessage) {
        let entry = ConversationEntry {
            id: temp_id(now),
            sender: self.me.clone(),
            receiver: receiver.clone(),
            content: content.into(),
            message_type,
            created_at: now,
            status: DeliveryStatus::Sending,
            message: None,
        };
        let request = send_request(&entry);
        let id = entry.id.clone();

        let list = self.conversations.entry(receiver.clone()).or_default();
        list.push(entry);
        sort(list);
        (id, request)
    }

    /// Applies a `newMessage` or `messageConfirmed` echo.
    pub fn reconcile(&mut self, message: &ChatMessage) -> Reconciled {
        let Some(other) = self.counterpart(message) else {
            return Reconciled::Ignored;
        };
        let from_me = message.sender.id == self.me;
        let window = self.echo_window;
        let list = self.conversations.entry(other).or_default();

        if list.iter().any(|entry| entry.id == message.id) {
            // Already known, e.g. from a history load that absorbed the send.
            return Reconciled::Duplicate;
        }

        if from_me {
            if let Some(index) = find_pending(list, message, window) {
                list[index] = ConversationEntry::persisted(message);
                sort(list);
                return Reconciled::Replaced;
            }
        }

        list.push(ConversationEntry::persisted(message));
        sort(list);
        Reconciled::Appended
    }

    /// Marks `Sending` entries older than the confirmation timeout as
    /// failed and returns their ids.
    pub fn expire_pending(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let timeout = self.confirm_timeout;
        let mut failed = Vec::new();
        for entry in self.conversations.values_mut().flatten() {
            if entry.status == DeliveryStatus::Sending && now - entry.created_at >= timeout {
                entry.status = DeliveryStatus::Failed;
                failed.push(entry.id.clone());
            }
        }
        failed
    }

    /// Puts a failed entry back into `Sending` with the same content and
    /// returns the request to send again.
    pub fn retry(&mut self, temp_id: &str, now: DateTime<Utc>) -> Option<SendMessage> {
        let list = self
            .conversations
            .values_mut()
            .find(|list| list.iter().any(|entry| entry.id == temp_id))?;
        let entry = list
            .iter_mut()
            .find(|entry| entry.id == temp_id && entry.status == DeliveryStatus::Failed)?;

        entry.status = DeliveryStatus::Sending;
        entry.created_at = now;
        let request = send_request(entry);
        sort(list);
        Some(request)
    }

    /// Replaces the persisted entries of a conversation with `history`,
    /// keeping local optimistic entries the history does not account for.
    pub fn load_history(&mut self, other: &UserId, history: Vec<ChatMessage>) {
        let window = self.echo_window;
        let existing = self.conversations.remove(other).unwrap_or_default();
        let (mut optimistic, persisted): (Vec<_>, Vec<_>) = existing
            .into_iter()
            .partition(ConversationEntry::is_optimistic);

        let mut merged: Vec<ConversationEntry> = Vec::with_capacity(history.len());
        for message in &history {
            if !message.between(&self.me, other) || merged.iter().any(|e| e.id == message.id) {
                continue;
            }
            let known = persisted.iter().any(|entry| entry.id == message.id);
            if message.sender.id == self.me && !known {
                if let Some(index) = find_pending(&optimistic, message, window) {
                    optimistic.remove(index);
                }
            }
            merged.push(ConversationEntry::persisted(message));
        }
        merged.extend(optimistic);

        sort(&mut merged);
        self.conversations.insert(other.clone(), merged);
    }

    fn counterpart(&self, message: &ChatMessage) -> Option<UserId> {
        if message.sender.id == self.me {
            Some(message.receiver.id.clone())
        } else if message.receiver.id == self.me {
            Some(message.sender.id.clone())
        } else {
            None
        }
    }
}

fn temp_id(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{TEMP_PREFIX}{}_{suffix:08x}", now.timestamp_millis())
}

fn send_request(entry: &ConversationEntry) -> SendMessage {
    SendMessage {
        receiver_id: Some(entry.receiver.clone()),
        content: entry.content.clone(),
        message_type: entry.message_type,
    }
}

fn echo_matches(entry: &ConversationEntry, message: &ChatMessage, window: chrono::Duration) -> bool {
    entry.receiver == message.receiver.id
        && entry.content == message.content
        && (entry.created_at - message.created_at).abs() < window
}

fn find_pending(
    list: &[ConversationEntry],
    message: &ChatMessage,
    window: chrono::Duration,
) -> Option<usize> {
    list.iter().position(|entry| {
        entry.status == DeliveryStatus::Sending
            && entry.is_optimistic()
            && echo_matches(entry, message, window)
    })
}

fn sort(list: &mut [ConversationEntry]) {
    list.sort_by_key(|entry| entry.created_at);
}
