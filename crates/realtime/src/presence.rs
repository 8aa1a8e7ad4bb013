//! Online/offline tracking derived from registry membership and liveness.
//!
//! Each user is either `Offline` or `Online`. Only transitions are broadcast;
//! heartbeats update the last-active timestamp silently. A periodic sweep
//! forces users offline when their last activity is older than the
//! staleness threshold, whatever the registry says, which covers transports
//! that vanished without a close.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use taskhub_auth::UserId;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::ServerEvent;
use crate::registry::{ConnectionRegistry, Session};
use crate::store::PresenceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Offline,
    Online,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub state: PresenceState,
    pub last_active: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn is_online(&self) -> bool {
        self.state == PresenceState::Online
    }
}

pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn PresenceStore>,
    records: Mutex<HashMap<UserId, PresenceRecord>>,
    stale_after: chrono::Duration,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn PresenceStore>,
        stale_after: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            records: Mutex::new(HashMap::new()),
            stale_after: chrono::Duration::from_std(stale_after)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
        }
    }

    /// Called once a session has been admitted. Returns true when the user
    /// went from offline to online.
    pub async fn on_connect(&self, session: &Session) -> bool {
        let now = Utc::now();
        let user = session.user_id();

        let (live, transitioned) = {
            let mut records = self.records.lock().await;
            let record = records.entry(user.clone()).or_insert(PresenceRecord {
                state: PresenceState::Offline,
                last_active: now,
            });
            record.last_active = now;

            let live = self.registry.session_count(user).await > 0;
            if live && record.state == PresenceState::Offline {
                record.state = PresenceState::Online;
                let notified = self
                    .registry
                    .broadcast(&ServerEvent::UserOnline(user.clone()), Some(session.id))
                    .await;
                info!(user_id = %user, notified, "user online");
                (live, true)
            } else {
                (live, false)
            }
        };

        if live {
            self.persist(user, true, now).await;
        }
        transitioned
    }

    /// Refreshes last-active. No broadcast unless the sweep had already
    /// marked the user offline while a session stayed connected.
    pub async fn on_heartbeat(&self, user: &UserId) {
        self.touch_at(user, Utc::now()).await;
    }

    pub async fn touch_at(&self, user: &UserId, now: DateTime<Utc>) {
        let revived = {
            let mut records = self.records.lock().await;
            let live = self.registry.session_count(user).await > 0;
            let record = records.entry(user.clone()).or_insert(PresenceRecord {
                state: PresenceState::Offline,
                last_active: now,
            });
            record.last_active = now;

            if live && record.state == PresenceState::Offline {
                record.state = PresenceState::Online;
                self.registry
                    .broadcast(&ServerEvent::UserOnline(user.clone()), None)
                    .await;
                info!(user_id = %user, "user back online after activity");
                true
            } else {
                false
            }
        };

        if revived {
            self.persist(user, true, now).await;
        } else if let Err(err) = self.store.touch_last_active(user, now).await {
            warn!(user_id = %user, error = %err, "failed to persist last active");
        }
    }

    /// Called after a session was evicted. Returns true when the user went
    /// offline because no sessions remain.
    pub async fn on_disconnect(&self, user: &UserId) -> bool {
        let now = Utc::now();

        let outcome = {
            let mut records = self.records.lock().await;
            if self.registry.session_count(user).await > 0 {
                None
            } else {
                let record = records.entry(user.clone()).or_insert(PresenceRecord {
                    state: PresenceState::Online,
                    last_active: now,
                });
                record.last_active = now;
                let was_online = record.state == PresenceState::Online;
                record.state = PresenceState::Offline;
                if was_online {
                    let notified = self
                        .registry
                        .broadcast(&ServerEvent::UserOffline(user.clone()), None)
                        .await;
                    info!(user_id = %user, notified, "user offline");
                }
                Some(was_online)
            }
        };

        match outcome {
            None => {
                debug!(user_id = %user, "session closed, user still has live sessions");
                false
            }
            Some(was_online) => {
                self.persist(user, false, now).await;
                was_online
            }
        }
    }

    pub async fn sweep_stale_users(&self) -> Vec<UserId> {
        self.sweep_stale_users_at(Utc::now()).await
    }

    /// Forces every online user idle for longer than the threshold offline.
    /// Users already offline are skipped, so each goes offline once.
    pub async fn sweep_stale_users_at(&self, now: DateTime<Utc>) -> Vec<UserId> {
        let expired: Vec<(UserId, DateTime<Utc>)> = {
            let mut records = self.records.lock().await;
            let mut expired = Vec::new();
            for (user, record) in records.iter_mut() {
                if record.is_online() && now - record.last_active > self.stale_after {
                    record.state = PresenceState::Offline;
                    self.registry
                        .broadcast(&ServerEvent::UserOffline(user.clone()), None)
                        .await;
                    expired.push((user.clone(), record.last_active));
                }
            }
            expired
        };

        for (user, last_active) in &expired {
            info!(user_id = %user, %last_active, "user marked offline by liveness sweep");
            self.persist(user, false, *last_active).await;
        }
        expired.into_iter().map(|(user, _)| user).collect()
    }

    /// Runs the liveness sweep every `period` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let expired = tracker.sweep_stale_users().await;
                debug!(expired = expired.len(), "presence sweep finished");
            }
        })
    }

    pub async fn is_online(&self, user: &UserId) -> bool {
        self.records
            .lock()
            .await
            .get(user)
            .is_some_and(PresenceRecord::is_online)
    }

    pub async fn record(&self, user: &UserId) -> Option<PresenceRecord> {
        self.records.lock().await.get(user).cloned()
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|(_, record)| record.is_online())
            .map(|(user, _)| user.clone())
            .collect()
    }

    async fn persist(&self, user: &UserId, online: bool, last_active: DateTime<Utc>) {
        if let Err(err) = self.store.set_presence(user, online, last_active).await {
            warn!(user_id = %user, online, error = %err, "failed to persist presence");
        }
    }
}
