//! Real-time presence, messaging and notification routing.
//!
//! Every transport session is admitted into a [`ConnectionRegistry`] that
//! groups sessions per user. Presence, the message relay, typing notices
//! and task notifications all route through that registry. [`RealtimeHub`]
//! wires the pieces together for transports.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod hub;
pub mod memory;
pub mod model;
pub mod notification;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod store;
pub mod typing;

pub use dispatch::NotificationDispatcher;
pub use error::{RelayError, StoreError, StoreResult};
pub use events::{ClientEvent, MessageError, SendMessage, ServerEvent, TypingNotice, TypingSignal};
pub use hub::{HubSettings, RealtimeHub};
pub use memory::MemoryStore;
pub use model::{ChatMessage, MessageType, NewMessage, UserProfile, UserSummary};
pub use notification::{Notification, NotificationType, Recipient, TaskEvent, TaskRef, TaskStatus};
pub use presence::{PresenceRecord, PresenceState, PresenceTracker};
pub use registry::{ConnectionRegistry, Session, SessionId, SessionSink};
pub use relay::MessageRelay;
pub use store::{MessageStore, PresenceStore};
pub use taskhub_auth::{Identity, Role, UserId};
pub use typing::TypingCoordinator;
