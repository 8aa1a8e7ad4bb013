//! Conversation history, read receipts and the chat user listing.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskhub_realtime::{model::sort_by_recent_activity, ChatMessage, UserId, UserProfile};
use utoipa::ToSchema;

use crate::error::{GatewayError, GatewayResult};
use crate::middleware::AuthenticatedUser;
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub sender_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountResponse {
    pub count: u64,
}

#[utoipa::path(
    get,
    path = "/api/chat/conversation/{user_id}",
    tag = "Chat",
    params(("user_id" = String, Path, description = "The other participant")),
    responses(
        (status = 200, description = "Messages in both directions, oldest first"),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn get_conversation(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(user_id): Path<String>,
) -> GatewayResult<Json<Vec<ChatMessage>>> {
    let other = UserId::new(user_id);
    let messages = state
        .hub()
        .messages()
        .find_conversation(&identity.user_id, &other)
        .await?;
    Ok(Json(messages))
}

#[utoipa::path(
    post,
    path = "/api/chat/read",
    tag = "Chat",
    request_body = MarkReadRequest,
    responses(
        (status = 200, description = "Number of messages marked read", body = MarkReadResponse),
        (status = 400, description = "Missing sender id"),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn mark_read(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Json(request): Json<MarkReadRequest>,
) -> GatewayResult<Json<MarkReadResponse>> {
    if request.sender_id.trim().is_empty() {
        return Err(GatewayError::InvalidRequest(
            "senderId is required".to_string(),
        ));
    }

    let sender = UserId::new(request.sender_id);
    let updated = state
        .hub()
        .messages()
        .mark_read(&sender, &identity.user_id, Utc::now())
        .await?;
    Ok(Json(MarkReadResponse { updated }))
}

#[utoipa::path(
    get,
    path = "/api/chat/unread-count",
    tag = "Chat",
    responses(
        (status = 200, description = "Unread messages addressed to the caller", body = UnreadCountResponse),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn unread_count(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> GatewayResult<Json<UnreadCountResponse>> {
    let count = state
        .hub()
        .messages()
        .unread_count(&identity.user_id)
        .await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// Every other user, most recently active first, with live presence.
#[utoipa::path(
    get,
    path = "/api/chat/users",
    tag = "Chat",
    responses(
        (status = 200, description = "Other users with their presence"),
        (status = 401, description = "Missing or invalid credential")
    )
)]
pub async fn list_users(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> GatewayResult<Json<Vec<UserProfile>>> {
    let presence = state.hub().presence();
    let mut users = Vec::new();
    for mut user in state.hub().users().list_users().await? {
        if user.id == identity.user_id {
            continue;
        }
        user.is_online = presence.is_online(&user.id).await;
        users.push(user);
    }

    sort_by_recent_activity(&mut users);
    Ok(Json(users))
}
