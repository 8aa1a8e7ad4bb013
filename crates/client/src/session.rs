//! A signed-in chat session: connection, local state and history together.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use taskhub_realtime::{ClientEvent, Identity, MessageType, Notification, UserId, UserProfile};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::config::ClientConfig;
use crate::connection::RealtimeClient;
use crate::conversation::{ConversationEntry, ConversationStore};
use crate::error::ClientResult;
use crate::history::HistoryClient;
use crate::listeners::{Listeners, Subscription};
use crate::notifications::NotificationCenter;
use crate::typing::{TypingDebouncer, TypingTracker};

const MAINTENANCE_PERIOD: Duration = Duration::from_millis(250);

struct LocalState {
    conversations: ConversationStore,
    notifications: NotificationCenter,
    typing: TypingTracker,
    outgoing_typing: HashMap<UserId, TypingDebouncer>,
    online: HashSet<UserId>,
}

type SharedState = Arc<Mutex<LocalState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, LocalState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ChatSession {
    identity: Identity,
    config: ClientConfig,
    listeners: Listeners,
    state: SharedState,
    client: RealtimeClient,
    history: HistoryClient,
    subscriptions: Vec<Subscription>,
    maintenance: JoinHandle<()>,
}

impl ChatSession {
    pub async fn connect(
        config: ClientConfig,
        token: impl Into<String>,
        identity: Identity,
    ) -> ClientResult<Self> {
        let token = token.into();
        let state: SharedState = Arc::new(Mutex::new(LocalState {
            conversations: ConversationStore::new(identity.user_id.clone(), &config),
            notifications: NotificationCenter::new(identity.clone(), &config),
            typing: TypingTracker::new(config.typing_idle),
            outgoing_typing: HashMap::new(),
            online: HashSet::new(),
        }));

        let listeners = Listeners::new();
        let subscriptions = track_events(&listeners, &state);
        let client = RealtimeClient::connect(config.clone(), token.clone(), listeners.clone()).await?;
        let history = HistoryClient::new(config.clone(), token);
        let maintenance = spawn_maintenance(Arc::clone(&state), client.clone());

        Ok(Self {
            identity,
            config,
            listeners,
            state,
            client,
            history,
            subscriptions,
            maintenance,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Listeners fed by the connection, for UI updates.
    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    pub fn history(&self) -> &HistoryClient {
        &self.history
    }

    /// Adds an optimistic entry, stops any typing indicator and sends the
    /// message. Returns the temporary id of the optimistic entry.
    pub async fn send_message(
        &self,
        receiver: &UserId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> ClientResult<String> {
        let (temp_id, request, stop_typing) = {
            let mut state = lock(&self.state);
            let (temp_id, request) =
                state
                    .conversations
                    .send_intent(receiver, content, message_type, Utc::now());
            let stop_typing = state
                .outgoing_typing
                .get_mut(receiver)
                .and_then(TypingDebouncer::message_sent);
            (temp_id, request, stop_typing)
        };

        if let Some(is_typing) = stop_typing {
            self.client.set_typing(receiver, is_typing).await?;
        }
        self.client.send(ClientEvent::SendMessage(request)).await?;
        Ok(temp_id)
    }

    /// Resends a failed message. Returns false if `temp_id` is not failed.
    pub async fn retry(&self, temp_id: &str) -> ClientResult<bool> {
        let request = lock(&self.state).conversations.retry(temp_id, Utc::now());
        match request {
            Some(request) => {
                self.client.send(ClientEvent::SendMessage(request)).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Records a keystroke in the conversation with `receiver`.
    pub async fn keystroke(&self, receiver: &UserId) -> ClientResult<()> {
        let started = {
            let mut state = lock(&self.state);
            let idle = self.config.typing_idle;
            state
                .outgoing_typing
                .entry(receiver.clone())
                .or_insert_with(|| TypingDebouncer::new(idle))
                .keystroke(Instant::now())
        };
        if let Some(is_typing) = started {
            self.client.set_typing(receiver, is_typing).await?;
        }
        Ok(())
    }

    /// Fetches the conversation history and merges it into local state.
    pub async fn load_conversation(&self, other: &UserId) -> ClientResult<Vec<ConversationEntry>> {
        let history = self.history.conversation(other).await?;
        let mut state = lock(&self.state);
        state.conversations.load_history(other, history);
        Ok(state.conversations.conversation(other).to_vec())
    }

    /// Fetches the user listing and seeds the online set from it.
    pub async fn refresh_users(&self) -> ClientResult<Vec<UserProfile>> {
        let users = self.history.users().await?;
        let mut state = lock(&self.state);
        for user in &users {
            if user.is_online {
                state.online.insert(user.id.clone());
            } else {
                state.online.remove(&user.id);
            }
        }
        Ok(users)
    }

    pub async fn mark_read(&self, sender: &UserId) -> ClientResult<u64> {
        self.history.mark_read(sender).await
    }

    pub fn conversation(&self, other: &UserId) -> Vec<ConversationEntry> {
        lock(&self.state).conversations.conversation(other).to_vec()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.state).notifications.notifications().to_vec()
    }

    pub fn unread_notifications(&self) -> usize {
        lock(&self.state).notifications.unread_count()
    }

    pub fn mark_notification_read(&self, id: &str) -> bool {
        lock(&self.state).notifications.mark_read(id)
    }

    pub fn mark_all_notifications_read(&self) -> usize {
        lock(&self.state).notifications.mark_all_read()
    }

    pub fn clear_notifications(&self) {
        lock(&self.state).notifications.clear();
    }

    pub fn is_typing(&self, user: &UserId) -> bool {
        lock(&self.state).typing.is_typing(user, Instant::now())
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        lock(&self.state).online.contains(user)
    }

    pub async fn disconnect(self) {
        self.maintenance.abort();
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        self.client.disconnect().await;
    }
}

fn track_events(listeners: &Listeners, state: &SharedState) -> Vec<Subscription> {
    let on_message = {
        let state = Arc::clone(state);
        listeners.message.subscribe(move |message| {
            let outcome = lock(&state).conversations.reconcile(message);
            debug!(message_id = %message.id, ?outcome, "message reconciled");
        })
    };
    let on_online = {
        let state = Arc::clone(state);
        listeners.online.subscribe(move |user| {
            lock(&state).online.insert(user.clone());
        })
    };
    let on_offline = {
        let state = Arc::clone(state);
        listeners.offline.subscribe(move |user| {
            let mut state = lock(&state);
            state.online.remove(user);
            state.typing.observe(
                &taskhub_realtime::TypingNotice {
                    user_id: user.clone(),
                    is_typing: false,
                },
                Instant::now(),
            );
        })
    };
    let on_typing = {
        let state = Arc::clone(state);
        listeners.typing.subscribe(move |notice| {
            lock(&state).typing.observe(notice, Instant::now());
        })
    };
    let on_notification = {
        let state = Arc::clone(state);
        listeners.notification.subscribe(move |notification| {
            let accepted = lock(&state).notifications.accept(notification.clone());
            debug!(notification_id = %notification.id, accepted, "task notification");
        })
    };

    vec![on_message, on_online, on_offline, on_typing, on_notification]
}

fn spawn_maintenance(state: SharedState, client: RealtimeClient) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(MAINTENANCE_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let stopped = {
                let mut state = lock(&state);
                let failed = state.conversations.expire_pending(Utc::now());
                if !failed.is_empty() {
                    debug!(count = failed.len(), "messages not confirmed in time");
                }

                let now = Instant::now();
                state.typing.expire(now);
                state
                    .outgoing_typing
                    .iter_mut()
                    .filter_map(|(receiver, debouncer)| {
                        debouncer.tick(now).map(|is_typing| (receiver.clone(), is_typing))
                    })
                    .collect::<Vec<_>>()
            };

            for (receiver, is_typing) in stopped {
                if client.set_typing(&receiver, is_typing).await.is_err() {
                    return;
                }
            }
        }
    })
}
