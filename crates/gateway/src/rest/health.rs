use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub connected_users: usize,
    pub sessions: usize,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health and connection totals", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    let (connected_users, sessions) = state.hub().registry().totals().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        connected_users,
        sessions,
    })
}
