//! Client side of a replicated room.
//!
//! Keeps a replica of the authoritative scene, this participant's own
//! session, and a mirror session for every other participant, and turns
//! server events into updates on them. Outgoing traffic is queued as JSON
//! text frames for whatever transport the embedder uses.

use crate::config::TransformerConfig;
use crate::engine::FrameInput;
use crate::math::Transform;
use crate::replication::{Outgoing, ReplicatedSession, Request, Role};
use crate::scene::{MemoryScene, SessionId, TraceFilter};
use crate::session::ManipulationSession;
use crate::sync::{ClientMessage, SyncEvent};
use glam::Vec3;
use std::collections::HashMap;
use std::time::Duration;

/// Replica scene plus the sessions replicated into it.
pub struct RemoteLink {
    config: TransformerConfig,
    scene: MemoryScene,
    /// Our own session, once the server assigned one.
    own: Option<ReplicatedSession>,
    /// Other participants' sessions, driven only by broadcasts.
    peers: HashMap<SessionId, ReplicatedSession>,
    current_room: Option<String>,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
}

impl RemoteLink {
    pub fn new(config: TransformerConfig) -> Self {
        Self {
            config,
            scene: MemoryScene::new(),
            own: None,
            peers: HashMap::new(),
            current_room: None,
            outgoing: Vec::new(),
        }
    }

    pub fn scene(&self) -> &MemoryScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut MemoryScene {
        &mut self.scene
    }

    pub fn session(&self) -> Option<&ReplicatedSession> {
        self.own.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ReplicatedSession> {
        self.own.as_mut()
    }

    pub fn peer(&self, session: SessionId) -> Option<&ReplicatedSession> {
        self.peers.get(&session)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn current_room(&self) -> Option<&str> {
        self.current_room.as_deref()
    }

    pub fn is_in_room(&self) -> bool {
        self.current_room.is_some()
    }

    // --- Room ---

    /// Request to join a room. Queues the join message.
    pub fn join_room(&mut self, room: &str) {
        self.queue(ClientMessage::Join {
            room: room.to_string(),
        });
    }

    /// Request to leave the current room. Queues the leave message.
    pub fn leave_room(&mut self) {
        if self.current_room.take().is_some() {
            self.queue(ClientMessage::Leave);
            self.own = None;
            self.peers.clear();
        }
    }

    /// Take pending outgoing messages (drains the queue).
    pub fn take_outgoing(&mut self) -> Vec<String> {
        self.flush();
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    // --- Events ---

    /// Apply one event from the client connection.
    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Connected => log::info!("Connected to session server"),
            SyncEvent::Disconnected => {
                log::info!("Disconnected from session server");
                self.current_room = None;
                self.own = None;
                self.peers.clear();
            }
            SyncEvent::JoinedRoom {
                room,
                session,
                peer_count,
                scene,
            } => {
                log::info!("Joined room {} as {} with {} peers", room, session, peer_count);
                self.scene = MemoryScene::from_snapshot(scene);
                self.own = Some(ReplicatedSession::new(
                    ManipulationSession::with_id(session, self.config.session.clone()),
                    Role::Remote,
                    true,
                    self.config.replication.clone(),
                ));
                self.peers.clear();
                self.current_room = Some(room);
            }
            SyncEvent::PeerJoined { session } => {
                log::info!("Peer {} joined", session);
                self.mirror(session);
            }
            SyncEvent::PeerLeft { session } => {
                log::info!("Peer {} left", session);
                if let Some(mut peer) = self.peers.remove(&session) {
                    peer.session_mut().deselect_all(&mut self.scene, false);
                }
            }
            SyncEvent::BroadcastReceived { session, broadcast } => {
                let own_id = self.own.as_ref().map(|s| s.session().id());
                if own_id == Some(session) {
                    if let Some(own) = self.own.as_mut() {
                        own.handle_broadcast(&mut self.scene, &broadcast);
                    }
                } else {
                    self.mirror(session);
                    if let Some(peer) = self.peers.get_mut(&session) {
                        peer.handle_broadcast(&mut self.scene, &broadcast);
                    }
                }
            }
            SyncEvent::SceneChanged { changes } => {
                for change in changes {
                    self.scene.apply_change(change);
                }
            }
            SyncEvent::Error { message } => log::warn!("Session server error: {}", message),
        }
    }

    fn mirror(&mut self, session: SessionId) {
        let config = &self.config;
        self.peers.entry(session).or_insert_with(|| {
            ReplicatedSession::new(
                ManipulationSession::with_id(session, config.session.clone()),
                Role::Remote,
                false,
                config.replication.clone(),
            )
        });
    }

    // --- Local input ---

    /// Trace along the pointer and let the authority confirm the result.
    pub fn trace(&mut self, origin: Vec3, direction: Vec3, filter: &TraceFilter, append: bool) -> bool {
        let Some(own) = self.own.as_mut() else {
            return false;
        };
        own.replicated_trace(&mut self.scene, origin, direction, filter, append)
    }

    /// Send a request for our session.
    pub fn request(&mut self, request: Request) {
        if let Some(own) = self.own.as_mut() {
            own.request(&mut self.scene, request);
        }
    }

    /// Commit the drag in progress.
    pub fn finish_transform(&mut self) {
        if let Some(own) = self.own.as_mut() {
            own.replicate_finish_transform(&mut self.scene);
        }
    }

    /// Per-frame update of every session. Returns our own delta.
    pub fn frame(&mut self, frame: &FrameInput) -> Transform {
        for peer in self.peers.values_mut() {
            peer.frame(&mut self.scene, frame);
        }
        match self.own.as_mut() {
            Some(own) => own.frame(&mut self.scene, frame),
            None => Transform::ZERO_DELTA,
        }
    }

    /// Advance the reconciliation loops.
    pub fn tick(&mut self, dt: Duration) {
        if let Some(own) = self.own.as_mut() {
            own.tick(&mut self.scene, dt);
        }
        for peer in self.peers.values_mut() {
            peer.tick(&mut self.scene, dt);
        }
    }

    // --- Outgoing ---

    fn queue(&mut self, message: ClientMessage) {
        match message.to_json() {
            Ok(json) => self.outgoing.push(json),
            Err(e) => log::error!("Failed to encode {:?}: {}", message, e),
        }
    }

    /// Move requests queued by our session into the outgoing frames. Mirror
    /// sessions only receive, so whatever they queue is dropped.
    fn flush(&mut self) {
        let requests = self.own.as_mut().map(|s| s.take_outgoing()).unwrap_or_default();
        for outgoing in requests {
            match outgoing {
                Outgoing::Request(request) => self.queue(ClientMessage::Call { request }),
                Outgoing::Broadcast(broadcast) => {
                    log::warn!("Remote session tried to broadcast {:?}", broadcast)
                }
            }
        }
        for peer in self.peers.values_mut() {
            peer.take_outgoing();
        }
        // the replica never reports its own changes
        self.scene.take_changes();
    }
}
