//! Shared application state for the gateway

use std::sync::Arc;

use taskhub_config::RealtimeConfig;
use taskhub_realtime::RealtimeHub;
use tokio::task::JoinHandle;

use crate::polling::PollSessions;

pub struct GatewayState {
    hub: Arc<RealtimeHub>,
    polls: Arc<PollSessions>,
}

impl GatewayState {
    pub fn new(hub: Arc<RealtimeHub>, realtime: &RealtimeConfig) -> Self {
        let polls = Arc::new(PollSessions::new(
            realtime.poll_wait(),
            realtime.poll_idle_timeout(),
        ));
        Self { hub, polls }
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    pub fn polls(&self) -> &Arc<PollSessions> {
        &self.polls
    }

    /// Starts the task that evicts abandoned long-poll sessions.
    pub fn spawn_poll_reaper(&self) -> JoinHandle<()> {
        self.polls.spawn_reaper(Arc::clone(&self.hub))
    }
}
