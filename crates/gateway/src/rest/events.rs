use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use taskhub_realtime::TaskEvent;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::error::{GatewayError, GatewayResult};
use crate::middleware::AuthenticatedUser;
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublishedNotification {
    pub id: String,
    pub delivered: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskEventResponse {
    pub notifications: Vec<PublishedNotification>,
}

/// Entry point for the task subsystem. Non-admin callers may only publish
/// events in which they are the actor. Each notification derived from the
/// event is routed to its recipient's live sessions.
#[utoipa::path(
    post,
    path = "/api/events/task",
    tag = "Events",
    responses(
        (status = 202, description = "Notifications dispatched", body = TaskEventResponse),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Caller may not publish this event")
    )
)]
pub async fn publish_task_event(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    body: String,
) -> GatewayResult<(StatusCode, Json<TaskEventResponse>)> {
    let event: TaskEvent = serde_json::from_str(&body)?;
    if !event.publishable_by(&identity) {
        warn!(publisher = %identity.user_id, "task event rejected");
        return Err(GatewayError::Forbidden(
            "not allowed to publish this task event".to_string(),
        ));
    }
    let outcomes = state.hub().publish_task_event(&event).await;
    info!(
        publisher = %identity.user_id,
        notifications = outcomes.len(),
        "task event published"
    );

    let notifications = outcomes
        .into_iter()
        .map(|(notification, delivered)| PublishedNotification {
            id: notification.id,
            delivered,
        })
        .collect();
    Ok((StatusCode::ACCEPTED, Json(TaskEventResponse { notifications })))
}
