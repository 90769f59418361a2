//! Authoritative room state.
//!
//! A room owns the scene and one authority-side session per connected peer.
//! Requests run against the scene here; the resulting broadcasts and scene
//! changes fan out to every peer through the room channel.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use transformer_core::replication::{Outgoing, ProtocolError, ProtocolResult};
use transformer_core::scene::{SceneChange, SceneSnapshot};
use transformer_core::{
    ManipulationSession, MemoryScene, ReplicatedSession, Request, Role, ServerMessage, SessionEvent,
    SessionId, TransformerConfig,
};

const CHANNEL_CAPACITY: usize = 256;

/// A frame for the room channel. `skip` names the peer that should not
/// receive it.
#[derive(Debug, Clone)]
pub struct RoomFrame {
    pub skip: Option<SessionId>,
    pub message: ServerMessage,
}

pub struct Room {
    config: TransformerConfig,
    scene: MemoryScene,
    sessions: HashMap<SessionId, ReplicatedSession>,
    tx: broadcast::Sender<RoomFrame>,
}

impl Room {
    pub fn new(config: TransformerConfig, snapshot: Option<SceneSnapshot>) -> Self {
        let mut scene = snapshot.map(MemoryScene::from_snapshot).unwrap_or_default();
        // copies become visible to peers once their spawn has been sent
        scene.set_clones_network_ready(false);
        scene.take_changes();
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            config,
            scene,
            sessions: HashMap::new(),
            tx,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomFrame> {
        self.tx.subscribe()
    }

    /// Add a peer. Returns the join confirmation for that peer.
    pub fn join(&mut self, room: &str, session: SessionId) -> ServerMessage {
        let replicated = ReplicatedSession::new(
            ManipulationSession::with_id(session, self.config.session.clone()),
            Role::Authority,
            false,
            self.config.replication.clone(),
        );
        self.sessions.insert(session, replicated);
        self.send(Some(session), ServerMessage::PeerJoined { session });
        info!("Session {} joined room {}", session, room);

        // the snapshot must include everything already sent as changes
        self.flush();
        ServerMessage::Joined {
            room: room.to_string(),
            session,
            peer_count: self.sessions.len(),
            scene: self.scene.snapshot(),
        }
    }

    /// Remove a peer, releasing whatever it had selected.
    pub fn leave(&mut self, session: SessionId) {
        if let Some(mut replicated) = self.sessions.remove(&session) {
            replicated.session_mut().deselect_all(&mut self.scene, false);
            self.send(Some(session), ServerMessage::PeerLeft { session });
            self.flush();
        }
    }

    /// Run a request for one peer.
    pub fn handle_request(&mut self, session: SessionId, request: Request) -> ProtocolResult<()> {
        let replicated = self
            .sessions
            .get_mut(&session)
            .ok_or(ProtocolError::UnknownSession(session))?;
        debug!("Session {} requested {:?}", session, request);
        let result = replicated.handle_request(&mut self.scene, request);
        self.flush();
        result
    }

    /// Advance every session's reconciliation loops.
    pub fn tick(&mut self, dt: Duration) {
        for replicated in self.sessions.values_mut() {
            replicated.tick(&mut self.scene, dt);
        }
        self.flush();
    }

    /// Send queued broadcasts, then the scene changes they caused.
    ///
    /// Broadcasts go first: a peer replays a delta before the absolute
    /// transforms that follow it, so both agree on the end state.
    fn flush(&mut self) {
        let mut outgoing = Vec::new();
        for (id, replicated) in self.sessions.iter_mut() {
            for event in replicated.session_mut().take_events() {
                if let SessionEvent::DesyncWarning { reason, waited } = event {
                    warn!("Session {} desync: {:?} after {:?}", id, reason, waited);
                }
            }
            for message in replicated.take_outgoing() {
                outgoing.push((*id, message));
            }
        }
        for (session, message) in outgoing {
            match message {
                Outgoing::Broadcast(broadcast) => {
                    self.send(None, ServerMessage::Broadcast { session, broadcast })
                }
                Outgoing::Request(request) => {
                    warn!("Authority session {} queued request {:?}", session, request)
                }
            }
        }

        let changes = self.scene.take_changes();
        if changes.is_empty() {
            return;
        }
        let spawned: Vec<_> = changes
            .iter()
            .flat_map(|change| match change {
                SceneChange::EntitySpawned { nodes, .. } => nodes.iter().map(|n| n.id).collect(),
                SceneChange::PartSpawned { node } => vec![node.id],
                _ => Vec::new(),
            })
            .collect();
        self.send(None, ServerMessage::Scene { changes });
        for node in spawned {
            self.scene.mark_network_ready(node);
        }
    }

    fn send(&self, skip: Option<SessionId>, message: ServerMessage) {
        // no receivers is fine: the room may be empty
        let _ = self.tx.send(RoomFrame { skip, message });
    }
}
