//! WebSocket Connection Handler
//!
//! One task per STOMP connection. The socket is split: a writer task drains
//! the session queue, the connection task reads frames, dispatches them and
//! watches the heart-beat.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use super::dispatch::{announce_presence, dispatch, Flow};
use super::frame::{Command, Frame, HEARTBEAT};
use super::gateway::Outbound;
use super::session::SessionState;
use crate::application::services::{ConversationService, UserService};
use crate::infrastructure::metrics;
use crate::presentation::middleware::auth::{authenticate, bearer_token};
use crate::startup::AppState;

/// STOMP versions offered during the WebSocket handshake
const STOMP_PROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];

/// How long queued frames may take to flush once the connection ends
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_message_size = state.settings.websocket.max_message_size;
    let max_frame_size = state.settings.websocket.max_frame_size;

    ws.protocols(STOMP_PROTOCOLS)
        .max_message_size(max_message_size)
        .max_frame_size(max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Why a connection never reached CONNECTED
#[derive(Debug, thiserror::Error)]
enum ConnectError {
    #[error("Connection closed before CONNECT")]
    Closed,

    #[error("No CONNECT frame received in time")]
    Timeout,

    #[error("{0}")]
    Rejected(String),
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    tracing::debug!(session_id = %session_id, "New WebSocket connection");

    let (sender, mut receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Outbound>();
    let mut writer = spawn_writer(sender, rx);

    let connect_timeout = Duration::from_secs(state.settings.websocket.connect_timeout_secs);
    let user_id = match timeout(connect_timeout, await_connect(&mut receiver, &state)).await {
        Ok(Ok(user_id)) => user_id,
        Ok(Err(ConnectError::Closed)) => {
            tracing::debug!(session_id = %session_id, "Connection closed before CONNECT");
            writer.abort();
            return;
        }
        result => {
            let error = match result {
                Ok(Err(e)) => e,
                _ => ConnectError::Timeout,
            };
            tracing::debug!(session_id = %session_id, error = %error, "CONNECT rejected");
            let _ = tx.send(Outbound::Frame(Frame::error(&error.to_string(), "")));
            let _ = tx.send(Outbound::Close);
            let _ = timeout(FLUSH_TIMEOUT, &mut writer).await;
            writer.abort();
            return;
        }
    };

    let mut session = SessionState::new(session_id.clone(), user_id);
    state
        .gateway
        .register_session(session_id.clone(), user_id, tx.clone());

    let heartbeat_ms = state.gateway.heartbeat_interval();
    let _ = tx.send(Outbound::Frame(Frame::connected(heartbeat_ms, &user_id.to_string())));
    mark_online(&state, user_id).await;

    tracing::info!(user_id = %user_id, session_id = %session_id, "STOMP session connected");

    let heartbeat = Duration::from_millis(heartbeat_ms);
    let mut ticker = interval(heartbeat);
    ticker.tick().await;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let flow = match msg {
                    Some(Ok(Message::Text(text))) => {
                        session.touch();
                        handle_text(&state, &session, text.as_str()).await
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        session.touch();
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => handle_text(&state, &session, text).await,
                            Err(_) => reject(&state, &session, "Frames must be UTF-8"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => Flow::Close,
                    Some(Ok(_)) => {
                        session.touch();
                        Flow::Continue
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                        Flow::Close
                    }
                };
                if flow == Flow::Close {
                    break;
                }
            }

            _ = ticker.tick() => {
                if !session.is_alive(heartbeat) {
                    tracing::info!(session_id = %session_id, "Heart-beat timeout, closing connection");
                    break;
                }
                if tx.send(Outbound::Heartbeat).is_err() {
                    break;
                }
                mark_online(&state, user_id).await;
            }
        }
    }

    let went_offline = state.gateway.unregister_session(&session_id);
    if went_offline {
        mark_offline(&state, user_id).await;
    }
    if let Err(e) = state.user_service().touch_last_seen(user_id).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to store last seen");
    }

    let _ = tx.send(Outbound::Close);
    drop(tx);
    let _ = timeout(FLUSH_TIMEOUT, &mut writer).await;
    writer.abort();

    tracing::info!(user_id = %user_id, session_id = %session_id, "STOMP session closed");
}

fn spawn_writer(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let result = match outbound {
                Outbound::Frame(frame) => sender.send(Message::Text(frame.encode().into())).await,
                Outbound::Heartbeat => sender.send(Message::Text(HEARTBEAT.into())).await,
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    })
}

/// Read frames until CONNECT (or STOMP) arrives and authenticate it
async fn await_connect(
    receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> Result<Uuid, ConnectError> {
    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec())
                .map_err(|_| ConnectError::Rejected("Frames must be UTF-8".into()))?,
            Ok(Message::Close(_)) | Err(_) => return Err(ConnectError::Closed),
            Ok(_) => continue,
        };

        let frame = match Frame::parse(&text) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => return Err(ConnectError::Rejected(e.to_string())),
        };
        metrics::record_stomp_frame(frame.command.as_str());

        if !matches!(frame.command, Command::Connect | Command::Stomp) {
            return Err(ConnectError::Rejected(format!(
                "Expected CONNECT, got {}",
                frame.command
            )));
        }

        let token = frame
            .get("Authorization")
            .or_else(|| frame.get("authorization"))
            .and_then(bearer_token)
            .or_else(|| frame.get("passcode"))
            .ok_or_else(|| ConnectError::Rejected("Missing credentials".into()))?;

        return authenticate(&state.verifier, token)
            .map(|user| user.user_id)
            .map_err(|e| ConnectError::Rejected(e.to_string()));
    }
    Err(ConnectError::Closed)
}

async fn handle_text(state: &AppState, session: &SessionState, text: &str) -> Flow {
    match Frame::parse(text) {
        Ok(Some(frame)) => dispatch(state, session, frame).await,
        Ok(None) => Flow::Continue,
        Err(e) => reject(state, session, &e.to_string()),
    }
}

/// Answer a malformed frame with ERROR and close
fn reject(state: &AppState, session: &SessionState, message: &str) -> Flow {
    tracing::debug!(session_id = %session.session_id, message, "Malformed STOMP frame");
    state
        .gateway
        .send_to_session(&session.session_id, Outbound::Frame(Frame::error(message, "")));
    Flow::Close
}

async fn mark_online(state: &AppState, user_id: Uuid) {
    if let Some(cache) = state.presence_cache() {
        if let Err(e) = cache.set_online(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to refresh presence");
        }
    }
}

/// Last session gone: announce offline on every conversation
async fn mark_offline(state: &AppState, user_id: Uuid) {
    match state.conversation_service().conversation_ids(user_id).await {
        Ok(ids) => {
            for conversation_id in ids {
                announce_presence(state, conversation_id, user_id, false);
            }
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to announce offline presence")
        }
    }

    if let Some(cache) = state.presence_cache() {
        if let Err(e) = cache.set_offline(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to clear presence");
        }
    }
}
