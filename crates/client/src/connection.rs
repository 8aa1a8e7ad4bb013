//! Websocket connection with heartbeats and automatic reconnection.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use taskhub_realtime::{ClientEvent, MessageType, SendMessage, ServerEvent, TypingSignal, UserId};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::listeners::Listeners;
use crate::reconnect::{Disconnect, ReconnectPolicy};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reconnecting { attempt: u32 },
    /// Terminal. `reason` is `None` after a client-requested disconnect.
    Closed { reason: Option<String> },
}

enum Command {
    Send(ClientEvent),
    Disconnect,
}

/// Handle to a live connection. Clones drive the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl RealtimeClient {
    /// Performs the handshake and starts the connection task. Fails with
    /// [`ClientError::AuthRejected`] when the server refuses the credential.
    pub async fn connect(
        config: ClientConfig,
        token: impl Into<String>,
        listeners: Listeners,
    ) -> ClientResult<Self> {
        let token = token.into();
        let socket = open_socket(&config, &token).await?;
        info!(url = %config.websocket_url(), "realtime connection established");

        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state) = watch::channel(ConnectionState::Connected);
        tokio::spawn(run_connection(
            config, token, listeners, socket, command_rx, state_tx,
        ));

        Ok(Self { commands, state })
    }

    pub async fn send(&self, event: ClientEvent) -> ClientResult<()> {
        self.commands
            .send(Command::Send(event))
            .await
            .map_err(|_| ClientError::Closed)
    }

    pub async fn send_message(
        &self,
        receiver: &UserId,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> ClientResult<()> {
        self.send(ClientEvent::SendMessage(SendMessage {
            receiver_id: Some(receiver.clone()),
            content: content.into(),
            message_type,
        }))
        .await
    }

    pub async fn set_typing(&self, receiver: &UserId, is_typing: bool) -> ClientResult<()> {
        self.send(ClientEvent::Typing(TypingSignal {
            receiver_id: Some(receiver.clone()),
            is_typing,
        }))
        .await
    }

    pub async fn heartbeat(&self) -> ClientResult<()> {
        self.send(ClientEvent::Heartbeat).await
    }

    /// Closes the connection. No reconnection follows.
    pub async fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect).await;
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Waits until the connection reaches a terminal state.
    pub async fn closed(&self) -> Option<String> {
        let mut state = self.state.clone();
        loop {
            if let ConnectionState::Closed { reason } = &*state.borrow_and_update() {
                return reason.clone();
            }
            if state.changed().await.is_err() {
                return None;
            }
        }
    }
}

async fn open_socket(config: &ClientConfig, token: &str) -> ClientResult<Socket> {
    let mut request = config
        .websocket_url()
        .into_client_request()
        .map_err(|err| ClientError::Transport(err.to_string()))?;
    let credential = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|err| ClientError::Transport(err.to_string()))?;
    request.headers_mut().insert(header::AUTHORIZATION, credential);

    match connect_async(request).await {
        Ok((socket, _)) => Ok(socket),
        Err(WsError::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
            let reason = response
                .body()
                .as_deref()
                .and_then(|body| serde_json::from_slice::<serde_json::Value>(body).ok())
                .and_then(|body| body["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| "Authentication error".to_string());
            Err(ClientError::AuthRejected(reason))
        }
        Err(err) => Err(ClientError::Transport(err.to_string())),
    }
}

async fn run_connection(
    config: ClientConfig,
    token: String,
    listeners: Listeners,
    socket: Socket,
    mut commands: mpsc::Receiver<Command>,
    state: watch::Sender<ConnectionState>,
) {
    let mut policy = ReconnectPolicy::from_config(&config);
    let mut socket = Some(socket);

    loop {
        let reason = match socket.take() {
            Some(live) => {
                policy.reset();
                let _ = state.send(ConnectionState::Connected);
                drive_session(&config, &listeners, live, &mut commands).await
            }
            None => match open_socket(&config, &token).await {
                Ok(live) => {
                    info!(attempts = policy.attempts(), "realtime connection re-established");
                    socket = Some(live);
                    continue;
                }
                Err(err) => Disconnect::from_error(&err),
            },
        };

        if reason == Disconnect::ClientRequested {
            info!("realtime connection closed by client");
            let _ = state.send(ConnectionState::Closed { reason: None });
            return;
        }

        let Some(delay) = policy.next_delay(&reason) else {
            let description = describe(&reason);
            warn!(reason = %description, "realtime connection lost, not reconnecting");
            listeners.error.emit(&description);
            let _ = state.send(ConnectionState::Closed {
                reason: Some(description),
            });
            return;
        };

        debug!(?reason, attempt = policy.attempts(), ?delay, "reconnecting");
        let _ = state.send(ConnectionState::Reconnecting {
            attempt: policy.attempts(),
        });
        if !wait_for_retry(delay, &mut commands).await {
            let _ = state.send(ConnectionState::Closed { reason: None });
            return;
        }
    }
}

/// Sleeps out the backoff. Returns false when the client asked to
/// disconnect meanwhile; sends issued while offline are dropped.
async fn wait_for_retry(delay: Duration, commands: &mut mpsc::Receiver<Command>) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            command = commands.recv() => match command {
                Some(Command::Send(event)) => {
                    debug!(event = ?event, "dropping event while reconnecting");
                }
                Some(Command::Disconnect) | None => return false,
            },
        }
    }
}

async fn drive_session(
    config: &ClientConfig,
    listeners: &Listeners,
    socket: Socket,
    commands: &mut mpsc::Receiver<Command>,
) -> Disconnect {
    let (mut writer, mut reader) = socket.split();
    let mut heartbeat = time::interval(config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if let Err(err) = write_event(&mut writer, &ClientEvent::Heartbeat).await {
                    return Disconnect::TransportError(err.to_string());
                }
            }
            command = commands.recv() => match command {
                Some(Command::Send(event)) => {
                    if let Err(err) = write_event(&mut writer, &event).await {
                        return Disconnect::TransportError(err.to_string());
                    }
                }
                Some(Command::Disconnect) | None => {
                    let _ = writer.send(Message::Close(None)).await;
                    return Disconnect::ClientRequested;
                }
            },
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => match ServerEvent::from_frame(&text) {
                    Ok(event) => {
                        listeners.dispatch(&event);
                    }
                    Err(err) => warn!(error = %err, "ignoring undecodable server frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return Disconnect::ServerClosed(frame.map(|f| f.reason.into_owned()));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Disconnect::TransportError(err.to_string()),
                None => return Disconnect::TransportClosed,
            },
        }
    }
}

async fn write_event<S>(writer: &mut S, event: &ClientEvent) -> ClientResult<()>
where
    S: futures_util::Sink<Message, Error = WsError> + Unpin,
{
    let frame = event.to_frame()?;
    writer
        .send(Message::Text(frame))
        .await
        .map_err(|err| ClientError::Transport(err.to_string()))
}

fn describe(reason: &Disconnect) -> String {
    match reason {
        Disconnect::TransportClosed => "connection closed".to_string(),
        Disconnect::TransportError(err) => err.clone(),
        Disconnect::ServerClosed(Some(reason)) => reason.clone(),
        Disconnect::ServerClosed(None) => "closed by server".to_string(),
        Disconnect::ClientRequested => "closed by client".to_string(),
        Disconnect::AuthRejected(reason) => reason.clone(),
    }
}
