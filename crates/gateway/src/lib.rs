//! # TaskHub Gateway Crate
//!
//! HTTP entry points for the realtime layer:
//!
//! - **WebSocket**: `/ws`, one socket per session
//! - **Long-poll**: `/realtime/poll`, the fallback transport
//! - **REST**: chat history, read receipts, user listing and task events
//!
//! Every transport authenticates before a session exists and then drives the
//! shared [`taskhub_realtime::RealtimeHub`].

pub mod error;
pub mod middleware;
pub mod polling;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::{GatewayError, GatewayResult};
pub use middleware::{request_credential, AuthenticatedUser};
pub use state::GatewayState;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use taskhub_config::HttpConfig;
use tower_http::cors::{Any, CorsLayer};

pub fn create_router(state: GatewayState, http: &HttpConfig) -> Router {
    let state = Arc::new(state);
    #[allow(unused_mut)]
    let mut router = Router::new()
        .merge(rest::create_rest_routes())
        .route("/ws", get(websocket::websocket_handler))
        .route("/realtime/poll", post(polling::open_poll_session))
        .route(
            "/realtime/poll/:session_id",
            get(polling::poll_events)
                .post(polling::submit_event)
                .delete(polling::close_poll_session),
        )
        .with_state(state)
        .layer(cors_layer(&http.allowed_origins))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    #[cfg(debug_assertions)]
    {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;

        #[derive(OpenApi)]
        #[openapi(
            paths(
                rest::health::health_check,
                rest::chat::get_conversation,
                rest::chat::mark_read,
                rest::chat::unread_count,
                rest::chat::list_users,
                rest::events::publish_task_event,
                polling::open_poll_session,
                polling::poll_events,
                polling::submit_event,
                polling::close_poll_session,
            ),
            components(schemas(
                rest::health::HealthResponse,
                rest::chat::MarkReadRequest,
                rest::chat::MarkReadResponse,
                rest::chat::UnreadCountResponse,
                rest::events::PublishedNotification,
                rest::events::TaskEventResponse,
                polling::PollSessionResponse,
            )),
            tags(
                (name = "Health", description = "Service health"),
                (name = "Chat", description = "Message history and user listing"),
                (name = "Events", description = "Task domain events"),
                (name = "Realtime", description = "Long-poll transport")
            )
        )]
        struct ApiDoc;

        router = router
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    router
}

/// An empty origin list allows any origin without credentials.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers([header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .allow_credentials(true)
}
