//! Observer registries for server events.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use taskhub_realtime::{ChatMessage, Notification, ServerEvent, TypingNotice, UserId};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slots<T> {
    next_id: u64,
    callbacks: Vec<(u64, Callback<T>)>,
}

/// Callbacks for one event kind. Clones share the same registry.
pub struct ListenerSet<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
        }
    }
}

impl<T: 'static> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                callbacks: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let id = slots.next_id;
            slots.next_id += 1;
            slots.callbacks.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(slots) = weak.upgrade() {
                    slots
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .callbacks
                        .retain(|(slot, _)| *slot != id);
                }
            })),
        }
    }

    /// Calls every subscriber outside the lock, so callbacks may subscribe
    /// or unsubscribe. Returns how many were called.
    pub fn emit(&self, value: &T) -> usize {
        let callbacks: Vec<Callback<T>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in &callbacks {
            callback(value);
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Token returned by [`ListenerSet::subscribe`]. Dropping it keeps the
/// callback registered; call [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct Listeners {
    pub message: ListenerSet<ChatMessage>,
    pub online: ListenerSet<UserId>,
    pub offline: ListenerSet<UserId>,
    pub typing: ListenerSet<TypingNotice>,
    pub notification: ListenerSet<Notification>,
    pub error: ListenerSet<String>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes a decoded server event to the matching listeners. Both
    /// `newMessage` and `messageConfirmed` go to message listeners.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        match event {
            ServerEvent::NewMessage(message) | ServerEvent::MessageConfirmed(message) => {
                self.message.emit(message)
            }
            ServerEvent::MessageError(err) => self.error.emit(&err.error),
            ServerEvent::UserOnline(user) => self.online.emit(user),
            ServerEvent::UserOffline(user) => self.offline.emit(user),
            ServerEvent::UserTyping(notice) => self.typing.emit(notice),
            ServerEvent::TaskNotification(notification) => self.notification.emit(notification),
        }
    }
}
