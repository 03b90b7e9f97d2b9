//! Chat routes — viewer websocket and shared-connection lifecycle.
//!
//! DESIGN
//! ======
//! Each websocket is one viewer. On upgrade it mounts a `ChatFeed` on the
//! shared connection and relays in both directions:
//! - feed updates → rendered `ChatView` JSON → browser
//! - browser JSON commands (scroll, resume, channel) → feed
//!
//! Closing the socket drops the feed's command channel, which ends the feed
//! and unregisters its listeners. The upstream connection stays up; only
//! `POST /api/chat/disconnect` tears it down.

use axum::Json;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chat::buffer::Viewport;
use crate::chat::feed::{ChatFeed, FeedCommand, FeedUpdate};
use crate::chat::render::render_view;
use crate::chat::{ChatError, ConnectionState, normalize_channel};
use crate::state::AppState;

/// Updates queued per viewer; past this the feed keeps only the newest.
const UPDATE_QUEUE: usize = 4;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub channel: Option<String>,
}

/// Frames a viewer may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Scroll {
        #[serde(flatten)]
        viewport: Viewport,
    },
    Resume,
    Channel {
        name: String,
    },
}

impl From<ClientCommand> for FeedCommand {
    fn from(command: ClientCommand) -> Self {
        match command {
            ClientCommand::Scroll { viewport } => Self::Scroll(viewport),
            ClientCommand::Resume => Self::Resume,
            ClientCommand::Channel { name } => Self::SwitchChannel(name),
        }
    }
}

fn parse_client_command(text: &str) -> Result<FeedCommand, serde_json::Error> {
    serde_json::from_str::<ClientCommand>(text).map(FeedCommand::from)
}

#[derive(Debug, Deserialize)]
pub struct ConnectBody {
    pub channel: String,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub state: ConnectionState,
    pub channel: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn status_body(state: &AppState) -> StatusBody {
    StatusBody { state: state.chat.state(), channel: state.chat.channel() }
}

fn chat_error_response(err: &ChatError) -> Response {
    let status = match err {
        ChatError::InvalidChannel(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ErrorBody { error: err.to_string() })).into_response()
}

// =============================================================================
// LIFECYCLE
// =============================================================================

pub async fn connect(State(state): State<AppState>, Json(body): Json<ConnectBody>) -> Response {
    match state.chat.connect(&body.channel) {
        Ok(()) => Json(status_body(&state)).into_response(),
        Err(e) => chat_error_response(&e),
    }
}

pub async fn disconnect(State(state): State<AppState>) -> Json<StatusBody> {
    state.chat.disconnect();
    Json(status_body(&state))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(status_body(&state))
}

// =============================================================================
// VIEWER SOCKET
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let requested = params.channel.unwrap_or_else(|| state.default_channel.clone());
    let channel = match normalize_channel(&requested) {
        Ok(channel) => channel,
        Err(e) => return chat_error_response(&e),
    };
    ws.on_upgrade(move |socket| run_ws(socket, state, channel))
}

async fn run_ws(mut socket: WebSocket, state: AppState, channel: String) {
    let viewer_id = Uuid::new_v4();

    let feed = match ChatFeed::mount(state.chat.clone(), &channel, state.buffer) {
        Ok(feed) => feed,
        Err(e) => {
            warn!(%viewer_id, error = %e, "ws: feed mount failed");
            return;
        }
    };
    let (commands, commands_rx) = mpsc::unbounded_channel();
    let (updates_tx, mut updates) = mpsc::channel(UPDATE_QUEUE);
    let feed_task = tokio::spawn(feed.run(commands_rx, updates_tx));

    info!(%viewer_id, %channel, "ws: viewer connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => match parse_client_command(text.as_str()) {
                        Ok(command) => {
                            if commands.send(command).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(%viewer_id, error = %e, "ws: invalid viewer frame"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            update = updates.recv() => {
                let Some(update) = update else { break };
                if send_update(&mut socket, &update).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(commands);
    drop(updates);
    let _ = feed_task.await;
    info!(%viewer_id, "ws: viewer disconnected");
}

async fn send_update(socket: &mut WebSocket, update: &FeedUpdate) -> Result<(), axum::Error> {
    let view = render_view(update);
    let text = match serde_json::to_string(&view) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "ws: view serialization failed");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
