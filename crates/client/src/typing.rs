//! Typing indicators in both directions.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use taskhub_realtime::{TypingNotice, UserId};

/// Who is typing to us. An indicator clears itself after the idle period
/// even if the `isTyping: false` notice never arrives.
#[derive(Debug, Clone)]
pub struct TypingTracker {
    idle: Duration,
    active: HashMap<UserId, Instant>,
}

impl TypingTracker {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            active: HashMap::new(),
        }
    }

    pub fn observe(&mut self, notice: &TypingNotice, now: Instant) {
        if notice.is_typing {
            self.active.insert(notice.user_id.clone(), now);
        } else {
            self.active.remove(&notice.user_id);
        }
    }

    pub fn is_typing(&self, user: &UserId, now: Instant) -> bool {
        self.active
            .get(user)
            .is_some_and(|since| now.saturating_duration_since(*since) < self.idle)
    }

    /// Drops indicators that went quiet and returns the users cleared.
    pub fn expire(&mut self, now: Instant) -> Vec<UserId> {
        let idle = self.idle;
        let mut cleared = Vec::new();
        self.active.retain(|user, since| {
            let alive = now.saturating_duration_since(*since) < idle;
            if !alive {
                cleared.push(user.clone());
            }
            alive
        });
        cleared
    }
}

/// Outgoing typing state for one conversation. Each method returns the
/// `isTyping` value to send, if any.
///
/// While keystrokes keep coming, `true` is re-sent at least every half idle
/// period so the receiving tracker never times out mid-burst.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    idle: Duration,
    last_keystroke: Option<Instant>,
    last_sent: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(idle: Duration) -> Self {
        Self {
            idle,
            last_keystroke: None,
            last_sent: None,
        }
    }

    pub fn keystroke(&mut self, now: Instant) -> Option<bool> {
        let renew = match (self.last_keystroke, self.last_sent) {
            (Some(_), Some(sent)) => now.saturating_duration_since(sent) >= self.idle / 2,
            _ => true,
        };
        self.last_keystroke = Some(now);
        if renew {
            self.last_sent = Some(now);
        }
        renew.then_some(true)
    }

    pub fn tick(&mut self, now: Instant) -> Option<bool> {
        match self.last_keystroke {
            Some(last) if now.saturating_duration_since(last) >= self.idle => {
                self.last_keystroke = None;
                self.last_sent = None;
                Some(false)
            }
            _ => None,
        }
    }

    pub fn message_sent(&mut self) -> Option<bool> {
        self.last_sent = None;
        self.last_keystroke.take().map(|_| false)
    }

    pub fn is_active(&self) -> bool {
        self.last_keystroke.is_some()
    }
}
