//! Long-poll fallback transport for clients that cannot hold a websocket.
//!
//! A poll session is an ordinary registry session whose outbound queue is
//! drained by `GET` requests instead of a socket writer. Sessions nobody
//! polls for longer than the idle timeout are reaped through the regular
//! disconnect path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use taskhub_auth::Identity;
use taskhub_realtime::{ClientEvent, RealtimeHub, ServerEvent, Session, SessionId};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::{GatewayError, GatewayResult};
use crate::middleware::AuthenticatedUser;
use crate::state::GatewayState;

pub struct PollSession {
    session: Session,
    outbound: Mutex<mpsc::Receiver<ServerEvent>>,
    last_seen: std::sync::Mutex<Instant>,
}

impl PollSession {
    pub fn session(&self) -> &Session {
        &self.session
    }

    fn touch(&self) {
        *self
            .last_seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Instant::now();
    }

    fn idle_since(&self) -> Instant {
        *self
            .last_seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

pub struct PollSessions {
    sessions: RwLock<HashMap<SessionId, Arc<PollSession>>>,
    wait: Duration,
    idle_timeout: Duration,
}

impl PollSessions {
    pub fn new(wait: Duration, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            wait,
            idle_timeout,
        }
    }

    pub async fn open(&self, hub: &RealtimeHub, identity: Identity) -> Session {
        let (session, outbound) = hub.connect_identity(identity).await;
        let entry = Arc::new(PollSession {
            session: session.clone(),
            outbound: Mutex::new(outbound),
            last_seen: std::sync::Mutex::new(Instant::now()),
        });
        self.sessions.write().await.insert(session.id, entry);
        info!(user_id = %session.user_id(), session_id = %session.id, "poll session opened");
        session
    }

    /// Looks up a poll session owned by `caller`.
    pub async fn get(&self, id: &str, caller: &Identity) -> GatewayResult<Arc<PollSession>> {
        let not_found = || GatewayError::NotFound(format!("poll session {id}"));
        let id = SessionId::parse(id).ok_or_else(not_found)?;
        let entry = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(not_found)?;

        if entry.session.user_id() != &caller.user_id {
            return Err(GatewayError::Forbidden(
                "poll session belongs to another user".to_string(),
            ));
        }
        Ok(entry)
    }

    /// Waits up to the poll window for the first event, then drains
    /// whatever else is queued.
    pub async fn poll(&self, entry: &PollSession) -> Vec<ServerEvent> {
        entry.touch();
        let mut outbound = entry.outbound.lock().await;
        let mut events = Vec::new();

        if let Ok(Some(first)) = time::timeout(self.wait, outbound.recv()).await {
            events.push(first);
            while let Ok(event) = outbound.try_recv() {
                events.push(event);
            }
        }

        entry.touch();
        events
    }

    pub async fn close(&self, hub: &RealtimeHub, entry: &PollSession) {
        let removed = self.sessions.write().await.remove(&entry.session.id);
        if removed.is_some() {
            hub.disconnect(&entry.session).await;
        }
    }

    /// Evicts sessions idle for longer than the idle timeout as of `now`.
    pub async fn reap_idle_at(&self, hub: &RealtimeHub, now: Instant) -> Vec<SessionId> {
        let expired: Vec<Arc<PollSession>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, entry)| {
                    now.saturating_duration_since(entry.idle_since()) > self.idle_timeout
                })
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let mut reaped = Vec::with_capacity(expired.len());
        for entry in expired {
            debug!(
                user_id = %entry.session.user_id(),
                session_id = %entry.session.id,
                "reaping idle poll session"
            );
            hub.disconnect(&entry.session).await;
            reaped.push(entry.session.id);
        }
        reaped
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub fn spawn_reaper(self: &Arc<Self>, hub: Arc<RealtimeHub>) -> JoinHandle<()> {
        let polls = Arc::clone(self);
        let period = (self.idle_timeout / 2).max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                polls.reap_idle_at(&hub, Instant::now()).await;
            }
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PollSessionResponse {
    pub session_id: String,
}

#[utoipa::path(
    post,
    path = "/realtime/poll",
    tag = "Realtime",
    responses(
        (status = 201, description = "Poll session opened", body = PollSessionResponse),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn open_poll_session(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> (StatusCode, Json<PollSessionResponse>) {
    let session = state.polls().open(state.hub(), identity).await;
    (
        StatusCode::CREATED,
        Json(PollSessionResponse {
            session_id: session.id.to_string(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/realtime/poll/{session_id}",
    tag = "Realtime",
    params(("session_id" = String, Path, description = "Poll session id")),
    responses(
        (status = 200, description = "Queued server events, empty when the wait elapsed"),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn poll_events(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(session_id): Path<String>,
) -> GatewayResult<Json<Vec<ServerEvent>>> {
    let entry = state.polls().get(&session_id, &identity).await?;
    Ok(Json(state.polls().poll(&entry).await))
}

#[utoipa::path(
    post,
    path = "/realtime/poll/{session_id}",
    tag = "Realtime",
    params(("session_id" = String, Path, description = "Poll session id")),
    responses(
        (status = 202, description = "Client event accepted"),
        (status = 400, description = "Body is not a client event"),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn submit_event(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(session_id): Path<String>,
    body: String,
) -> GatewayResult<StatusCode> {
    let entry = state.polls().get(&session_id, &identity).await?;
    let event = ClientEvent::from_frame(&body)?;
    entry.touch();
    state.hub().handle(entry.session(), event).await;
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    delete,
    path = "/realtime/poll/{session_id}",
    tag = "Realtime",
    params(("session_id" = String, Path, description = "Poll session id")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn close_poll_session(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(session_id): Path<String>,
) -> GatewayResult<StatusCode> {
    let entry = state.polls().get(&session_id, &identity).await?;
    state.polls().close(state.hub(), &entry).await;
    Ok(StatusCode::NO_CONTENT)
}
