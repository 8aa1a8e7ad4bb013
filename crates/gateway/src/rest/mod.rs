//! REST endpoints backing the chat history, listing and task event routes.

pub mod chat;
pub mod events;
pub mod health;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::GatewayState;

pub fn create_rest_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/chat/conversation/:user_id",
            get(chat::get_conversation),
        )
        .route("/api/chat/read", post(chat::mark_read))
        .route("/api/chat/unread-count", get(chat::unread_count))
        .route("/api/chat/users", get(chat::list_users))
        .route("/api/events/task", post(events::publish_task_event))
}
