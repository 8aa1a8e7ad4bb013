//! Client side of the TaskHub realtime layer.
//!
//! [`RealtimeClient`] owns the websocket: it authenticates at handshake,
//! sends heartbeats and reconnects after transport failures. Decoded server
//! events are fanned out through [`Listeners`]. [`ChatSession`] combines the
//! connection with the local state a chat UI needs: reconciled
//! conversations, typing indicators and the notification list.

pub mod config;
pub mod connection;
pub mod conversation;
pub mod error;
pub mod history;
pub mod listeners;
pub mod notifications;
pub mod reconnect;
pub mod session;
pub mod typing;

pub use config::ClientConfig;
pub use connection::{ConnectionState, RealtimeClient};
pub use conversation::{ConversationEntry, ConversationStore, DeliveryStatus, Reconciled};
pub use error::{ClientError, ClientResult};
pub use history::HistoryClient;
pub use listeners::{ListenerSet, Listeners, Subscription};
pub use notifications::NotificationCenter;
pub use reconnect::{is_auth_failure_reason, Disconnect, ReconnectPolicy};
pub use session::ChatSession;
pub use typing::{TypingDebouncer, TypingTracker};
