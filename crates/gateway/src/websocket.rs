//! Websocket transport: one socket is one session.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use taskhub_auth::Identity;
use taskhub_realtime::ClientEvent;
use tracing::{debug, info, warn};

use crate::middleware::AuthenticatedUser;
use crate::state::GatewayState;

/// Credentials are checked by the extractor, so a rejected handshake is
/// answered with 401 and never upgraded.
pub async fn websocket_handler(
    State(state): State<Arc<GatewayState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, identity: Identity) {
    let hub = Arc::clone(state.hub());
    let (session, mut outbound) = hub.connect_identity(identity).await;
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(event = event.name(), error = %err, "failed to encode server event");
                    continue;
                }
            };
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let recv_hub = Arc::clone(&hub);
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    debug!(session_id = %recv_session.id, error = %err, "websocket read failed");
                    break;
                }
            };

            match message {
                Message::Text(text) => match ClientEvent::from_frame(&text) {
                    Ok(event) => recv_hub.handle(&recv_session, event).await,
                    Err(err) => {
                        warn!(
                            session_id = %recv_session.id,
                            error = %err,
                            "ignoring unparseable frame"
                        );
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(user_id = %session.user_id(), session_id = %session.id, "websocket closed");
    hub.disconnect(&session).await;
}
