use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, stream::StreamExt};
use poker_room_core::{ActionError, ClientId, ClientMessage, ServerKind, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::ConnId;
use crate::config::ServerConfig;
use crate::room::{Flow, Room};

/// How often a join is retried when the room empties out underneath it.
const JOIN_RETRIES: usize = 3;

/// Server-wide state: the room directory.
pub struct AppState {
    pub rooms: DashMap<String, Arc<Room>>,
    pub config: Arc<ServerConfig>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: ServerConfig) -> SharedState {
        Arc::new(AppState { rooms: DashMap::new(), config: Arc::new(config) })
    }

    /// The room called `name`, created on first use.
    pub fn room(self: &Arc<Self>, name: &str) -> Result<Arc<Room>, ActionError> {
        if let Some(room) = self.rooms.get(name) {
            return Ok(Arc::clone(room.value()));
        }
        let room = Room::new(name, Arc::clone(&self.config), Arc::downgrade(self))?;
        Ok(Arc::clone(self.rooms.entry(name.to_string()).or_insert(room).value()))
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new().route("/ws/{room}", get(websocket_handler)).with_state(state)
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let max = state.config.max_conn_bytes;
    ws.max_message_size(max).max_frame_size(max).on_upgrade(move |socket| handle_socket(socket, state, room))
}

/// Lifetime of one websocket connection.
async fn handle_socket(socket: WebSocket, state: SharedState, room_name: String) {
    let mut room = match state.room(&room_name) {
        Ok(room) => room,
        Err(e) => {
            warn!(room = %room_name, error = %e, "couldn't create room");
            return;
        }
    };
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.channel_capacity);
    // held until the client is admitted; after that only the room feeds the writer
    let mut tx = Some(tx);
    let conn: ConnId = Uuid::new_v4();
    let keepalive = state.config.keepalive();

    // writer: drains the outbox and keeps the connection alive
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(keepalive);
        ticker.tick().await;
        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let payload = match serde_json::to_string(&msg) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "couldn't encode message");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        debug!("keepalive ping failed");
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    let mut client: Option<ClientId> = None;
    let mut clean = false;

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "socket read failed");
                break;
            }
        };
        let msg = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "undecodable message, dropping connection");
                break;
            }
        };

        if let Some(id) = client {
            if room.handle(id, msg).await == Flow::Exit {
                clean = true;
                break;
            }
            continue;
        }
        let Some(outbox) = tx.clone() else { break };

        match msg {
            ClientMessage::NewConnection(settings) => {
                client = room.join(conn, outbox.clone(), settings.clone()).await;
                for _ in 0..JOIN_RETRIES {
                    if client.is_some() || !room.is_retired() {
                        break;
                    }
                    debug!(room = %room_name, "room retired during join, retrying");
                    room = match state.room(&room_name) {
                        Ok(room) => room,
                        Err(e) => {
                            warn!(room = %room_name, error = %e, "couldn't create room");
                            break;
                        }
                    };
                    client = room.join(conn, outbox.clone(), settings.clone()).await;
                }
            }
            ClientMessage::Reconnect { private_id } => {
                client = room.reconnect(conn, outbox, private_id).await;
            }
            _ => {
                let msg = ServerMessage::text(ServerKind::BadRequest, "connect to the room first");
                let _ = outbox.send(msg).await;
                continue;
            }
        }
        if client.is_none() {
            break;
        }
        tx = None;
        room.drop_lagged().await;
    }

    if let Some(id) = client {
        room.disconnect(id, conn, clean).await;
    }
    info!(room = %room_name, clean, "connection closed");
}
