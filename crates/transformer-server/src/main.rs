//! Transformer WebSocket Server
//!
//! Authoritative server for replicated manipulation sessions. Every room owns
//! a scene; peers send requests, the server executes them and broadcasts the
//! canonical outcome to the whole room.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "room": "room-id" }
//! { "type": "call", "request": { "type": "clear_domain" } }
//! { "type": "leave" }
//! ```
//!
//! ## Environment
//!
//! - `TRANSFORMER_ADDR`: listen address (default `0.0.0.0:3040`)
//! - `TRANSFORMER_CONFIG`: session/replication config JSON file
//! - `TRANSFORMER_SCENE`: scene snapshot JSON every new room starts from

mod room;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use room::{Room, RoomFrame};
use std::{
    net::SocketAddr,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::{Mutex, broadcast};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use transformer_core::{ClientMessage, ServerMessage, SessionId, TransformerConfig};
use transformer_core::scene::SceneSnapshot;

const DEFAULT_ADDR: &str = "0.0.0.0:3040";
/// How often rooms advance their reconciliation loops.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

type SharedRoom = Arc<Mutex<Room>>;

/// Shared application state
struct AppState {
    config: TransformerConfig,
    /// Scene every new room starts from
    initial_scene: Option<SceneSnapshot>,
    /// Active rooms
    rooms: DashMap<String, SharedRoom>,
}

impl AppState {
    fn new(config: TransformerConfig, initial_scene: Option<SceneSnapshot>) -> Self {
        Self {
            config,
            initial_scene,
            rooms: DashMap::new(),
        }
    }

    /// Get or create a room. New rooms start ticking right away.
    fn get_or_create_room(&self, room_id: &str) -> SharedRoom {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                let room = Arc::new(Mutex::new(Room::new(
                    self.config.clone(),
                    self.initial_scene.clone(),
                )));
                tokio::spawn(tick_room(room_id.to_string(), Arc::downgrade(&room)));
                info!("Created room {}", room_id);
                room
            })
            .clone()
    }

    /// Remove a peer, dropping the room once it is empty.
    async fn leave_room(&self, room_id: &str, session: SessionId) {
        let Some(room) = self.rooms.get(room_id).map(|r| r.clone()) else {
            return;
        };
        let mut room = room.lock().await;
        room.leave(session);
        if room.is_empty() {
            drop(room);
            self.rooms.remove(room_id);
            info!("Closed room {}", room_id);
        }
    }
}

/// Advance a room until it is dropped.
async fn tick_room(room_id: String, room: Weak<Mutex<Room>>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last = tokio::time::Instant::now();
    loop {
        interval.tick().await;
        let Some(room) = room.upgrade() else {
            break;
        };
        let now = tokio::time::Instant::now();
        room.lock().await.tick(now - last);
        last = now;
    }
    info!("Stopped ticking room {}", room_id);
}

fn load_config() -> Result<(TransformerConfig, Option<SceneSnapshot>), Box<dyn std::error::Error>> {
    let config = match std::env::var("TRANSFORMER_CONFIG") {
        Ok(path) => {
            info!("Loading config from {}", path);
            TransformerConfig::from_json_file(&path)?
        }
        Err(_) => TransformerConfig::default(),
    };
    let scene = match std::env::var("TRANSFORMER_SCENE") {
        Ok(path) => {
            info!("Loading scene from {}", path);
            let json = std::fs::read_to_string(&path)?;
            Some(serde_json::from_str::<SceneSnapshot>(&json)?)
        }
        Err(_) => None,
    };
    Ok((config, scene))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transformer_server=info,transformer_core=info,tower_http=info".into()),
        )
        .init();

    let (config, scene) = load_config()?;
    let state = Arc::new(AppState::new(config, scene));

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = std::env::var("TRANSFORMER_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()?;
    info!("Transformer server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Index page
async fn index() -> &'static str {
    "Transformer Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(message: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            error!("Failed to encode {:?}: {}", message, e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = SessionId::new();
    info!("New connection: {}", session);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<(String, SharedRoom)> = None;
    let mut room_rx: Option<broadcast::Receiver<RoomFrame>> = None;

    loop {
        // replies for this peer only
        let mut replies: Vec<ServerMessage> = Vec::new();

        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Join { room }) => {
                                // Leave current room if any
                                if let Some((old_room, _)) = current_room.take() {
                                    state.leave_room(&old_room, session).await;
                                }

                                let shared = state.get_or_create_room(&room);
                                let joined = {
                                    let mut guard = shared.lock().await;
                                    // subscribe first so nothing after the snapshot is missed
                                    room_rx = Some(guard.subscribe());
                                    guard.join(&room, session)
                                };
                                replies.push(joined);
                                current_room = Some((room, shared));
                            }
                            Ok(ClientMessage::Leave) => {
                                if let Some((room, _)) = current_room.take() {
                                    state.leave_room(&room, session).await;
                                    info!("Session {} left room {}", session, room);
                                }
                                room_rx = None;
                            }
                            Ok(ClientMessage::Call { request }) => match &current_room {
                                Some((_, shared)) => {
                                    if let Err(e) = shared.lock().await.handle_request(session, request) {
                                        warn!("Rejected request from {}: {}", session, e);
                                        replies.push(ServerMessage::Error { message: e.to_string() });
                                    }
                                }
                                None => replies.push(ServerMessage::Error {
                                    message: "Not in a room".to_string(),
                                }),
                            },
                            Err(e) => {
                                warn!("Invalid message from {}: {}", session, e);
                                replies.push(ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        replies.push(ServerMessage::Error {
                            message: "Binary frames are not supported".to_string(),
                        });
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", session, e);
                        break;
                    }
                }
            }

            // Handle broadcast messages from room
            frame = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await,
                    None => {
                        // No room joined, just wait forever
                        std::future::pending::<Result<RoomFrame, broadcast::error::RecvError>>().await
                    }
                }
            } => {
                match frame {
                    Ok(frame) if frame.skip != Some(session) => replies.push(frame.message),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // the replica is stale: drop the peer so it rejoins with a fresh snapshot
                        warn!("Session {} lagged {} frames behind, disconnecting", session, missed);
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => room_rx = None,
                }
            }
        }

        let mut closed = false;
        for reply in replies.iter().filter_map(encode) {
            if sender.send(reply).await.is_err() {
                closed = true;
                break;
            }
        }
        if closed {
            break;
        }
    }

    // Cleanup on disconnect
    if let Some((room, _)) = current_room {
        state.leave_room(&room, session).await;
    }
    info!("Connection closed: {}", session);
}
