//! WebSocket client for replicated sessions.
//!
//! Wire messages between participants and the session server, plus a native
//! client that talks to the server from a background thread.

use crate::replication::{Broadcast, Request};
use crate::scene::{SceneChange, SceneSnapshot, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client connection errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid WebSocket URL scheme: {0}")]
    InvalidScheme(String),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Not connected")]
    NotConnected,
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type for client operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Ask the authority to run a request for our session
    Call { request: Request },
}

impl ClientMessage {
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with the current scene
    Joined {
        room: String,
        /// Session the server created for us
        session: SessionId,
        peer_count: usize,
        scene: SceneSnapshot,
    },
    /// Peer joined the room
    PeerJoined { session: SessionId },
    /// Peer left the room
    PeerLeft { session: SessionId },
    /// Canonical state for one session
    Broadcast {
        session: SessionId,
        broadcast: Broadcast,
    },
    /// Changes to the authoritative scene
    Scene { changes: Vec<SceneChange> },
    /// Error message
    Error { message: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from the WebSocket client
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// Joined a room
    JoinedRoom {
        room: String,
        session: SessionId,
        peer_count: usize,
        scene: SceneSnapshot,
    },
    PeerJoined { session: SessionId },
    PeerLeft { session: SessionId },
    BroadcastReceived {
        session: SessionId,
        broadcast: Broadcast,
    },
    SceneChanged { changes: Vec<SceneChange> },
    /// Error occurred
    Error { message: String },
}

impl From<ServerMessage> for SyncEvent {
    fn from(message: ServerMessage) -> Self {
        match message {
            ServerMessage::Joined {
                room,
                session,
                peer_count,
                scene,
            } => SyncEvent::JoinedRoom {
                room,
                session,
                peer_count,
                scene,
            },
            ServerMessage::PeerJoined { session } => SyncEvent::PeerJoined { session },
            ServerMessage::PeerLeft { session } => SyncEvent::PeerLeft { session },
            ServerMessage::Broadcast { session, broadcast } => {
                SyncEvent::BroadcastReceived { session, broadcast }
            }
            ServerMessage::Scene { changes } => SyncEvent::SceneChanged { changes },
            ServerMessage::Error { message } => SyncEvent::Error { message },
        }
    }
}

/// Parse a server text frame.
pub fn parse_server_message(text: &str) -> Option<SyncEvent> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => Some(message.into()),
        Err(e) => {
            log::warn!("Failed to parse server message: {}", e);
            None
        }
    }
}

/// First 100 characters of a frame, for logging.
#[cfg(not(target_arch = "wasm32"))]
fn preview(text: &str) -> &str {
    text.char_indices().nth(100).map_or(text, |(i, _)| &text[..i])
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeWebSocket {
        state: ConnectionState,
        events: Vec<SyncEvent>,
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<SyncEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        /// Create a new disconnected WebSocket client.
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                events: Vec::new(),
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to a session server.
        pub fn connect(&mut self, url: &str) -> SyncResult<()> {
            if self.cmd_tx.is_some() {
                return Err(SyncError::AlreadyConnected);
            }
            let parsed = validate_url(url)?;

            self.state = ConnectionState::Connecting;
            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();
            let handle = thread::spawn(move || run_socket(parsed, cmd_rx, event_tx));

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        /// Disconnect from the server.
        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

        /// Send a text frame.
        pub fn send(&self, msg: &str) -> SyncResult<()> {
            let Some(tx) = &self.cmd_tx else {
                return Err(SyncError::NotConnected);
            };
            tx.send(WsCommand::Send(msg.to_string()))
                .map_err(|e| SyncError::Send(e.to_string()))
        }

        /// Encode and send a client message.
        pub fn send_message(&self, msg: &ClientMessage) -> SyncResult<()> {
            self.send(&msg.to_json()?)
        }

        /// Poll for pending events (non-blocking).
        pub fn poll_events(&mut self) -> Vec<SyncEvent> {
            if let Some(rx) = &self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        SyncEvent::Connected => self.state = ConnectionState::Connected,
                        SyncEvent::Disconnected => self.state = ConnectionState::Disconnected,
                        SyncEvent::Error { .. } => self.state = ConnectionState::Error,
                        _ => {}
                    }
                    self.events.push(event);
                }
            }
            std::mem::take(&mut self.events)
        }

        pub fn state(&self) -> ConnectionState {
            self.state
        }

        pub fn is_connected(&self) -> bool {
            self.state == ConnectionState::Connected
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }

    /// Accept only ws:// and wss:// URLs.
    pub fn validate_url(url: &str) -> SyncResult<Url> {
        let parsed = Url::parse(url).map_err(|e| SyncError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(parsed),
            other => Err(SyncError::InvalidScheme(other.to_string())),
        }
    }

    fn run_socket(url: Url, cmd_rx: Receiver<WsCommand>, event_tx: Sender<SyncEvent>) {
        log::info!("WebSocket thread: connecting to {}", url);
        let (mut socket, response) = match connect(url.as_str()) {
            Ok(connected) => connected,
            Err(e) => {
                log::error!("WebSocket connection failed: {}", e);
                let _ = event_tx.send(SyncEvent::Error {
                    message: format!("Connection failed: {}", e),
                });
                return;
            }
        };
        log::info!("WebSocket connected, status: {}", response.status());
        let _ = event_tx.send(SyncEvent::Connected);

        // short read timeout so commands are picked up between frames
        if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
            let _ = tcp.set_read_timeout(Some(Duration::from_millis(20)));
            let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
        }

        loop {
            match cmd_rx.try_recv() {
                Ok(WsCommand::Send(msg)) => {
                    log::debug!("WebSocket sending: {}", preview(&msg));
                    if let Err(e) = socket.send(Message::Text(msg)) {
                        log::error!("WebSocket send error: {}", e);
                        break;
                    }
                }
                Ok(WsCommand::Close) => {
                    log::info!("WebSocket close requested");
                    let _ = socket.close(None);
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("WebSocket command channel disconnected");
                    break;
                }
                Err(TryRecvError::Empty) => {}
            }

            match socket.read() {
                Ok(Message::Text(txt)) => {
                    if let Some(event) = parse_server_message(&txt) {
                        let _ = event_tx.send(event);
                    }
                }
                Ok(Message::Ping(data)) => {
                    let _ = socket.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket received close frame");
                    break;
                }
                Ok(_) => {}
                Err(tungstenite::Error::Io(ref e))
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    log::error!("WebSocket read error: {}", e);
                    break;
                }
            }
        }

        log::info!("WebSocket thread exiting");
        let _ = event_tx.send(SyncEvent::Disconnected);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::{NativeWebSocket, validate_url};
