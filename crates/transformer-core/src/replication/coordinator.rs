//! Authority-aware wrapper around a [`ManipulationSession`].
//!
//! On a remote participant, mutating operations are predicted locally where
//! it helps responsiveness and otherwise queued as [`Request`]s for the
//! authority. The authority executes requests and answers with
//! [`Broadcast`]s, applying each one to its own copy of the session before
//! queueing it. Two polling loops reconcile state that cannot be confirmed
//! immediately: newly cloned nodes waiting to become known to every
//! participant, and replicated selections that referenced nodes the
//! receiver did not know yet.

use super::poll::{PollTask, PollTick};
use super::protocol::{Broadcast, Outgoing, ProtocolResult, Request};
use crate::config::ReplicationConfig;
use crate::domain::Granularity;
use crate::engine::FrameInput;
use crate::math::Transform;
use crate::scene::{NodeId, Scene, TraceFilter};
use crate::session::{DesyncReason, ManipulationSession, SessionEvent};
use glam::Vec3;
use std::time::Duration;

/// Which side of the replication boundary a session lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the canonical scene; executes requests.
    Authority,
    /// Observes the authority; sends requests.
    Remote,
}

pub struct ReplicatedSession {
    session: ManipulationSession,
    role: Role,
    /// Whether the participant driving this session is on this machine.
    local_controller: bool,
    config: ReplicationConfig,
    outbox: Vec<Outgoing>,
    unreplicated_clones: Vec<NodeId>,
    clone_watch: Option<PollTask>,
    resync_selection: bool,
    resync_watch: Option<PollTask>,
}

impl ReplicatedSession {
    pub fn new(
        session: ManipulationSession,
        role: Role,
        local_controller: bool,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            session,
            role,
            local_controller,
            config,
            outbox: Vec::new(),
            unreplicated_clones: Vec::new(),
            clone_watch: None,
            resync_selection: false,
            resync_watch: None,
        }
    }

    pub fn session(&self) -> &ManipulationSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ManipulationSession {
        &mut self.session
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role == Role::Authority
    }

    pub fn is_local_controller(&self) -> bool {
        self.local_controller
    }

    /// Whether the last replicated selection could not be fully applied.
    pub fn resync_pending(&self) -> bool {
        self.resync_selection
    }

    /// Clones still waiting to become known to every participant.
    pub fn unreplicated_clones(&self) -> &[NodeId] {
        &self.unreplicated_clones
    }

    pub fn is_polling(&self) -> bool {
        self.clone_watch.is_some() || self.resync_watch.is_some()
    }

    /// Drain messages waiting to be sent.
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    // --- Requests ---

    /// Issue a request: executed right away on the authority, queued
    /// otherwise.
    pub fn request<S: Scene + ?Sized>(&mut self, scene: &mut S, request: Request) {
        if self.is_authority() {
            if let Err(e) = self.handle_request(scene, request) {
                log::warn!("Dropped local request: {}", e);
            }
        } else {
            self.outbox.push(Outgoing::Request(request));
        }
    }

    /// Execute a request on the authority and broadcast the result.
    pub fn handle_request<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        request: Request,
    ) -> ProtocolResult<()> {
        if !self.is_authority() {
            log::warn!("Ignoring {:?}: only the authority executes requests", request);
            return Ok(());
        }
        request.validate()?;

        match request {
            Request::TraceByFilter {
                start,
                end,
                filter,
                append,
            } => self.server_trace(scene, start, end, filter, append),
            Request::SetDomain { domain } => self.broadcast(scene, Broadcast::SetDomain { domain }),
            Request::ClearDomain => self.broadcast(scene, Broadcast::ClearDomain),
            Request::ApplyDelta { transform } => {
                self.broadcast(scene, Broadcast::ApplyDelta { transform })
            }
            Request::DeselectAll { destroy } => {
                self.broadcast(scene, Broadcast::DeselectAll { destroy })
            }
            Request::SetSpace { space } => self.broadcast(scene, Broadcast::SetSpace { space }),
            Request::SetTransformationKind { kind } => {
                self.broadcast(scene, Broadcast::SetTransformationKind { kind })
            }
            Request::SetGranularity { granularity } => {
                self.broadcast(scene, Broadcast::SetGranularity { granularity })
            }
            Request::SetRotateOnLocalAxis { enabled } => {
                self.broadcast(scene, Broadcast::SetRotateOnLocalAxis { enabled })
            }
            Request::CloneSelected { select_new, append } => {
                self.server_clone_selected(scene, select_new, append)
            }
            Request::ResyncSelection => self.broadcast_selection(scene),
        }
        Ok(())
    }

    fn server_trace<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        start: Vec3,
        end: Vec3,
        mut filter: TraceFilter,
        append: bool,
    ) {
        // the gizmo is placed relative to the remote viewer, not to us
        if !self.local_controller {
            if let Some(gizmo) = self.session.gizmo() {
                filter.ignored_gizmos.push(gizmo.id());
            }
        }
        let resolved = self.session.trace(scene, start, end, &filter, append);
        if !resolved && !append {
            self.session.deselect_all(scene, false);
        }
        let domain = self.session.domain();
        self.broadcast(scene, Broadcast::SetDomain { domain });
        self.broadcast_selection(scene);
    }

    fn server_clone_selected<S: Scene + ?Sized>(&mut self, scene: &mut S, select_new: bool, append: bool) {
        if self.session.granularity() == Granularity::Part {
            log::warn!("Part cloning is not supported over the network");
            return;
        }
        let selected = self.session.selection().as_slice().to_vec();
        let clones = self.session.clone_from_list(scene, &selected);
        if !select_new {
            return;
        }
        self.session.select_nodes(scene, &clones, append);
        self.unreplicated_clones = clones;
        // each batch gets its own minimum wait and cap
        self.clone_watch = Some(PollTask::new(
            self.config.clone_check_interval(),
            self.config.max_poll_wait(),
        ));
    }

    // --- Broadcasts ---

    fn broadcast<S: Scene + ?Sized>(&mut self, scene: &mut S, broadcast: Broadcast) {
        self.apply_broadcast(scene, &broadcast);
        self.outbox.push(Outgoing::Broadcast(broadcast));
    }

    fn broadcast_selection<S: Scene + ?Sized>(&mut self, scene: &mut S) {
        let nodes = self.session.selection().as_slice().to_vec();
        self.broadcast(scene, Broadcast::SetSelection { nodes });
    }

    /// Apply a broadcast received from the authority.
    pub fn handle_broadcast<S: Scene + ?Sized>(&mut self, scene: &mut S, broadcast: &Broadcast) {
        if self.is_authority() {
            log::debug!("Authority already applied {:?}", broadcast);
            return;
        }
        self.apply_broadcast(scene, broadcast);
    }

    fn apply_broadcast<S: Scene + ?Sized>(&mut self, scene: &mut S, broadcast: &Broadcast) {
        match broadcast {
            Broadcast::SetDomain { domain } => self.session.set_domain(*domain),
            Broadcast::ClearDomain => self.session.clear_domain(),
            Broadcast::SetSelection { nodes } => self.apply_selection(scene, nodes),
            Broadcast::ApplyDelta { transform } => {
                // the local controller predicted this already
                if !self.local_controller {
                    self.session.apply_delta_transform(scene, transform);
                }
            }
            Broadcast::DeselectAll { destroy } => {
                self.session.deselect_all(scene, *destroy);
            }
            Broadcast::SetSpace { space } => self.session.set_space(scene, *space),
            Broadcast::SetTransformationKind { kind } => {
                self.session.set_transformation_kind(scene, *kind)
            }
            Broadcast::SetGranularity { granularity } => {
                self.session.set_granularity(scene, *granularity)
            }
            Broadcast::SetRotateOnLocalAxis { enabled } => {
                self.session.set_rotate_on_local_axis(*enabled)
            }
        }
    }

    /// Replace the selection with the authoritative one. Nodes this scene
    /// does not know yet are dropped and a resync is scheduled.
    fn apply_selection<S: Scene + ?Sized>(&mut self, scene: &mut S, nodes: &[NodeId]) {
        if !self.is_authority() {
            log::debug!("Replicated selection of {} nodes", nodes.len());
        }
        if self.session.selection().as_slice() != nodes {
            let known: Vec<NodeId> = nodes.iter().copied().filter(|n| scene.contains(*n)).collect();
            self.session.deselect_all(scene, false);
            self.session.select_nodes(scene, &known, true);
        }

        self.resync_selection = self.session.selection().len() != nodes.len();
        if self.resync_selection && self.resync_watch.is_none() {
            self.resync_watch = Some(PollTask::new(
                self.config.resync_interval(),
                self.config.max_poll_wait(),
            ));
        }
    }

    // --- Replicated operations ---

    /// Trace along a pointer ray. The trace always runs locally first; a
    /// remote participant then asks the authority to either adopt the gizmo
    /// domain it found or to repeat the trace.
    pub fn replicated_trace<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        origin: Vec3,
        direction: Vec3,
        filter: &TraceFilter,
        append: bool,
    ) -> bool {
        let end = origin + direction.normalize_or_zero() * self.session.config().trace_distance;
        let resolved = self.session.trace(scene, origin, end, filter, append);

        if self.is_authority() {
            if !resolved && !append {
                self.session.deselect_all(scene, false);
            }
            let domain = self.session.domain();
            self.broadcast(scene, Broadcast::SetDomain { domain });
            self.broadcast_selection(scene);
        } else if !resolved && !append {
            self.request(scene, Request::DeselectAll { destroy: false });
        } else if self.session.domain().is_none() {
            self.request(
                scene,
                Request::TraceByFilter {
                    start: origin,
                    end,
                    filter: filter.clone(),
                    append,
                },
            );
        } else {
            let domain = self.session.domain();
            self.request(scene, Request::SetDomain { domain });
        }
        resolved
    }

    /// Commit a finished drag: stop the manipulation everywhere and send the
    /// motion accumulated since the last commit.
    pub fn replicate_finish_transform<S: Scene + ?Sized>(&mut self, scene: &mut S) {
        self.request(scene, Request::ClearDomain);
        let transform = *self.session.network_delta();
        self.request(scene, Request::ApplyDelta { transform });
        self.session.reset_network_delta();
    }

    /// Clone the selection directly. Remote participants should send
    /// [`Request::CloneSelected`] instead; the authority's next selection
    /// broadcast will overrule whatever is spawned here.
    pub fn clone_selected<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        select_new: bool,
        append: bool,
    ) -> Vec<NodeId> {
        if !self.is_authority() {
            log::warn!("Cloning on a remote participant, use a clone request instead");
        }
        self.session.clone_selected(scene, select_new, append)
    }

    // --- Ticking ---

    /// Per-frame session update. Only the local controller drives the gizmo
    /// from the pointer.
    pub fn frame<S: Scene + ?Sized>(&mut self, scene: &mut S, frame: &FrameInput) -> Transform {
        let mut frame = *frame;
        if !self.local_controller {
            frame.cursor_ray = None;
        }
        self.session.tick(scene, &frame)
    }

    /// Advance the polling loops by `dt`.
    pub fn tick<S: Scene + ?Sized>(&mut self, scene: &mut S, dt: Duration) {
        self.tick_clone_watch(scene, dt);
        self.tick_resync_watch(scene, dt);
    }

    fn tick_clone_watch<S: Scene + ?Sized>(&mut self, scene: &mut S, dt: Duration) {
        let Some(watch) = self.clone_watch.as_mut() else {
            return;
        };
        let tick = watch.advance(dt);
        let elapsed = watch.elapsed();
        match tick {
            PollTick::Idle => {}
            PollTick::Fire => {
                let min = self.config.min_clone_time();
                self.unreplicated_clones.retain(|node| {
                    let ready = scene.is_network_ready(*node) && elapsed > min;
                    // destroyed before it was announced
                    scene.contains(*node) && !ready
                });
                if self.unreplicated_clones.is_empty() {
                    log::info!(
                        "{} selected nodes replicated after {:?}",
                        self.session.selection().len(),
                        elapsed
                    );
                    self.clone_watch = None;
                    self.broadcast_selection(scene);
                }
            }
            PollTick::Expired => {
                let pending = self.unreplicated_clones.len();
                log::warn!(
                    "Gave up waiting for {} clones to replicate after {:?}",
                    pending,
                    elapsed
                );
                self.session.push_event(SessionEvent::DesyncWarning {
                    reason: DesyncReason::UnreplicatedClones { pending },
                    waited: elapsed,
                });
                self.unreplicated_clones.clear();
                self.clone_watch = None;
                self.broadcast_selection(scene);
            }
        }
    }

    fn tick_resync_watch<S: Scene + ?Sized>(&mut self, scene: &mut S, dt: Duration) {
        let Some(watch) = self.resync_watch.as_mut() else {
            return;
        };
        let tick = watch.advance(dt);
        let elapsed = watch.elapsed();
        match tick {
            PollTick::Idle => {}
            PollTick::Fire if self.resync_selection => {
                log::warn!("Resyncing selection");
                self.request(scene, Request::ResyncSelection);
            }
            PollTick::Fire => {
                log::info!("Selection resync finished after {:?}", elapsed);
                self.resync_watch = None;
            }
            PollTick::Expired => {
                log::warn!("Selection still out of sync after {:?}", elapsed);
                self.session.push_event(SessionEvent::DesyncWarning {
                    reason: DesyncReason::SelectionMismatch,
                    waited: elapsed,
                });
                self.resync_watch = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::domain::TransformationDomain;
    use crate::scene::MemoryScene;
    use crate::session::tests::scene_with;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn replicated(role: Role, local_controller: bool) -> ReplicatedSession {
        ReplicatedSession::new(
            ManipulationSession::new(SessionConfig::default()),
            role,
            local_controller,
            ReplicationConfig::default(),
        )
    }

    fn requests(outgoing: &[Outgoing]) -> Vec<Request> {
        outgoing
            .iter()
            .filter_map(|o| match o {
                Outgoing::Request(r) => Some(r.clone()),
                Outgoing::Broadcast(_) => None,
            })
            .collect()
    }

    fn broadcasts(outgoing: &[Outgoing]) -> Vec<Broadcast> {
        outgoing
            .iter()
            .filter_map(|o| match o {
                Outgoing::Broadcast(b) => Some(b.clone()),
                Outgoing::Request(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_remote_requests_are_queued() {
        let (mut scene, _, _) = scene_with(1);
        let mut remote = replicated(Role::Remote, true);
        remote.request(&mut scene, Request::SetRotateOnLocalAxis { enabled: true });
        assert!(!remote.session().config().rotate_on_local_axis);
        assert_eq!(
            requests(&remote.take_outgoing()),
            vec![Request::SetRotateOnLocalAxis { enabled: true }]
        );
    }

    #[test]
    fn test_authority_executes_and_broadcasts() {
        let (mut scene, _, _) = scene_with(1);
        let mut authority = replicated(Role::Authority, false);
        authority
            .handle_request(&mut scene, Request::SetRotateOnLocalAxis { enabled: true })
            .unwrap();
        assert!(authority.session().config().rotate_on_local_axis);
        assert_eq!(
            broadcasts(&authority.take_outgoing()),
            vec![Broadcast::SetRotateOnLocalAxis { enabled: true }]
        );
    }

    #[test]
    fn test_invalid_request_rejected() {
        let (mut scene, _, _) = scene_with(1);
        let mut authority = replicated(Role::Authority, false);
        let bad = Request::ApplyDelta {
            transform: Transform::ZERO_DELTA.with_translation(Vec3::splat(f32::INFINITY)),
        };
        assert!(authority.handle_request(&mut scene, bad).is_err());
        assert!(authority.take_outgoing().is_empty());
    }

    #[test]
    fn test_server_trace_broadcasts_domain_and_selection() {
        let (mut scene, _, roots) = scene_with(2);
        let mut authority = replicated(Role::Authority, false);
        let request = Request::TraceByFilter {
            start: Vec3::new(3.0, 0.0, 10.0),
            end: Vec3::new(3.0, 0.0, -10.0),
            filter: TraceFilter::default(),
            append: false,
        };
        authority.handle_request(&mut scene, request).unwrap();
        assert_eq!(
            broadcasts(&authority.take_outgoing()),
            vec![
                Broadcast::SetDomain {
                    domain: TransformationDomain::None
                },
                Broadcast::SetSelection { nodes: vec![roots[1]] },
            ]
        );
    }

    #[test]
    fn test_server_trace_ignores_remote_gizmo() {
        let (mut scene, _, roots) = scene_with(1);
        let trace_x_handle = |session: &mut ReplicatedSession, scene: &mut MemoryScene| {
            let request = Request::TraceByFilter {
                start: Vec3::new(1.0, 0.0, 10.0),
                end: Vec3::new(1.0, 0.0, -10.0),
                filter: TraceFilter::default(),
                append: true,
            };
            session.handle_request(scene, request).unwrap();
        };

        let mut remote_owned = replicated(Role::Authority, false);
        remote_owned.session_mut().select_node(&mut scene, roots[0], false);
        trace_x_handle(&mut remote_owned, &mut scene);
        assert!(remote_owned.session().domain().is_none());

        let mut hosted = replicated(Role::Authority, true);
        hosted.session_mut().select_node(&mut scene, roots[0], false);
        trace_x_handle(&mut hosted, &mut scene);
        assert_eq!(hosted.session().domain(), TransformationDomain::XAxis);
    }

    #[test]
    fn test_apply_delta_skipped_by_local_controller() {
        let (mut scene, _, roots) = scene_with(1);
        let delta = Broadcast::ApplyDelta {
            transform: Transform::ZERO_DELTA.with_translation(Vec3::Y),
        };

        let mut own = replicated(Role::Remote, true);
        own.session_mut().select_node(&mut scene, roots[0], false);
        own.handle_broadcast(&mut scene, &delta);
        assert_eq!(scene.world_transform(roots[0]).unwrap().translation, Vec3::ZERO);

        let mut mirror = replicated(Role::Remote, false);
        mirror.session_mut().select_node(&mut scene, roots[0], false);
        mirror.handle_broadcast(&mut scene, &delta);
        assert!(scene.world_transform(roots[0]).unwrap().translation.abs_diff_eq(Vec3::Y, 1.0e-6));
    }

    #[test]
    fn test_resync_flag_lifecycle() {
        let (mut scene, _, roots) = scene_with(1);
        let mut remote = replicated(Role::Remote, true);
        remote.session_mut().select_node(&mut scene, roots[0], false);
        remote.session_mut().set_domain(TransformationDomain::XAxis);

        // the authority selected a node we have not received yet
        let mut authority_scene = MemoryScene::from_snapshot(scene.snapshot());
        let (_, unknown) = authority_scene.spawn_entity("late", Transform::IDENTITY);
        let nodes = vec![roots[0], unknown];
        remote.handle_broadcast(&mut scene, &Broadcast::SetSelection { nodes: nodes.clone() });
        assert!(remote.resync_pending());
        assert_eq!(remote.session().selection().as_slice(), &[roots[0]]);

        remote.tick(&mut scene, Duration::ZERO);
        assert_eq!(requests(&remote.take_outgoing()), vec![Request::ResyncSelection]);
        remote.tick(&mut scene, ms(100));
        assert_eq!(requests(&remote.take_outgoing()), vec![Request::ResyncSelection]);
        assert!(remote.resync_pending());

        for change in authority_scene.take_changes() {
            scene.apply_change(change);
        }
        remote.handle_broadcast(&mut scene, &Broadcast::SetSelection { nodes: nodes.clone() });
        assert!(!remote.resync_pending());
        assert_eq!(remote.session().selection().as_slice(), nodes.as_slice());

        remote.tick(&mut scene, ms(100));
        assert!(remote.take_outgoing().is_empty());
        assert!(!remote.is_polling());
    }

    #[test]
    fn test_resync_expiry_warns() {
        let (mut scene, _, _) = scene_with(1);
        let mut remote = replicated(Role::Remote, true);
        remote.handle_broadcast(&mut scene, &Broadcast::SetSelection { nodes: vec![NodeId::new()] });
        assert!(remote.resync_pending());

        remote.tick(&mut scene, ms(6_000));
        assert!(!remote.is_polling());
        assert!(remote.resync_pending());
        let events = remote.session_mut().take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::DesyncWarning {
                reason: DesyncReason::SelectionMismatch,
                ..
            }
        )));
    }

    #[test]
    fn test_clone_loop_waits_for_replication() {
        let (mut scene, entities, roots) = scene_with(2);
        scene.set_clones_network_ready(false);
        let mut authority = replicated(Role::Authority, false);
        authority.session_mut().select_nodes(&mut scene, &roots, false);

        authority
            .handle_request(&mut scene, Request::CloneSelected { select_new: true, append: false })
            .unwrap();
        let clones = authority.unreplicated_clones().to_vec();
        assert_eq!(clones.len(), 2);
        assert_eq!(authority.session().selection().as_slice(), clones.as_slice());
        for node in &clones {
            assert!(!roots.contains(node));
            assert!(!entities.contains(&scene.owner(*node).unwrap()));
        }
        assert!(authority.take_outgoing().is_empty());

        authority.tick(&mut scene, Duration::ZERO);
        authority.tick(&mut scene, ms(50));
        assert_eq!(authority.unreplicated_clones().len(), 2);
        assert!(authority.take_outgoing().is_empty());

        for node in &clones {
            scene.mark_network_ready(*node);
        }
        authority.tick(&mut scene, ms(50));
        assert!(authority.unreplicated_clones().is_empty());
        assert!(!authority.is_polling());
        assert_eq!(
            broadcasts(&authority.take_outgoing()),
            vec![Broadcast::SetSelection { nodes: clones }]
        );
    }

    #[test]
    fn test_clone_loop_respects_minimum_time() {
        let (mut scene, _, roots) = scene_with(1);
        let mut authority = replicated(Role::Authority, false);
        authority.session_mut().select_node(&mut scene, roots[0], false);
        authority
            .handle_request(&mut scene, Request::CloneSelected { select_new: true, append: false })
            .unwrap();

        // ready at once, but not announced before the minimum time
        authority.tick(&mut scene, Duration::ZERO);
        assert_eq!(authority.unreplicated_clones().len(), 1);
        authority.tick(&mut scene, ms(50));
        assert!(authority.unreplicated_clones().is_empty());
    }

    #[test]
    fn test_clone_loop_expiry_still_broadcasts() {
        let (mut scene, _, roots) = scene_with(1);
        scene.set_clones_network_ready(false);
        let mut authority = replicated(Role::Authority, false);
        authority.session_mut().select_node(&mut scene, roots[0], false);
        authority
            .handle_request(&mut scene, Request::CloneSelected { select_new: true, append: false })
            .unwrap();

        authority.tick(&mut scene, ms(6_000));
        assert!(!authority.is_polling());
        assert_eq!(broadcasts(&authority.take_outgoing()).len(), 1);
        let events = authority.session_mut().take_events();
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::DesyncWarning {
                reason: DesyncReason::UnreplicatedClones { pending: 1 },
                ..
            }
        )));
    }

    #[test]
    fn test_second_clone_batch_restarts_wait() {
        let (mut scene, _, roots) = scene_with(1);
        scene.set_clones_network_ready(false);
        let mut authority = replicated(Role::Authority, false);
        authority.session_mut().select_node(&mut scene, roots[0], false);
        let clone = Request::CloneSelected { select_new: true, append: false };

        authority.handle_request(&mut scene, clone.clone()).unwrap();
        authority.tick(&mut scene, ms(4_950));
        assert!(authority.is_polling());

        authority.handle_request(&mut scene, clone).unwrap();
        let second = authority.unreplicated_clones().to_vec();
        authority.take_outgoing();
        authority.tick(&mut scene, ms(100));
        assert!(authority.is_polling());
        assert_eq!(authority.unreplicated_clones(), second.as_slice());
        assert!(broadcasts(&authority.take_outgoing()).is_empty());

        for node in &second {
            scene.mark_network_ready(*node);
        }
        authority.tick(&mut scene, ms(50));
        assert!(!authority.is_polling());
        assert_eq!(
            broadcasts(&authority.take_outgoing()),
            vec![Broadcast::SetSelection { nodes: second }]
        );
        let events = authority.session_mut().take_events();
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::DesyncWarning { .. })));
    }

    #[test]
    fn test_part_clone_refused_over_network() {
        let (mut scene, _, roots) = scene_with(1);
        let mut authority = replicated(Role::Authority, false);
        authority.session_mut().set_granularity(&mut scene, Granularity::Part);
        authority.session_mut().select_node(&mut scene, roots[0], false);
        authority
            .handle_request(&mut scene, Request::CloneSelected { select_new: true, append: false })
            .unwrap();
        assert_eq!(scene.node_count(), 1);
        assert!(authority.unreplicated_clones().is_empty());
    }

    #[test]
    fn test_remote_trace_flow() {
        let (mut scene, _, roots) = scene_with(1);
        let mut remote = replicated(Role::Remote, true);
        let filter = TraceFilter::default();

        // miss without append
        remote.replicated_trace(&mut scene, Vec3::new(50.0, 0.0, 10.0), Vec3::NEG_Z, &filter, false);
        assert_eq!(
            requests(&remote.take_outgoing()),
            vec![Request::DeselectAll { destroy: false }]
        );

        // scene hit: the authority repeats the trace
        remote.replicated_trace(&mut scene, Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z, &filter, false);
        let sent = requests(&remote.take_outgoing());
        assert!(matches!(sent.as_slice(), [Request::TraceByFilter { append: false, .. }]));
        assert_eq!(remote.session().selection().as_slice(), &[roots[0]]);

        // gizmo hit: only the domain is sent
        remote.replicated_trace(&mut scene, Vec3::new(1.0, 0.0, 10.0), Vec3::NEG_Z, &filter, false);
        assert_eq!(
            requests(&remote.take_outgoing()),
            vec![Request::SetDomain {
                domain: TransformationDomain::XAxis
            }]
        );
    }

    #[test]
    fn test_finish_transform_flushes_network_delta() {
        let (mut scene, _, roots) = scene_with(1);
        let mut remote = replicated(Role::Remote, true);
        remote.session_mut().select_node(&mut scene, roots[0], false);
        remote.session_mut().set_domain(TransformationDomain::XAxis);

        let mut frame = FrameInput {
            camera_location: Vec3::new(0.0, 0.0, 10.0),
            camera_forward: Vec3::NEG_Z,
            fov_degrees: 90.0,
            cursor_ray: Some((Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z)),
        };
        remote.frame(&mut scene, &frame);
        frame.cursor_ray = Some((Vec3::new(2.0, 0.0, 10.0), Vec3::NEG_Z));
        remote.frame(&mut scene, &frame);

        remote.replicate_finish_transform(&mut scene);
        let sent = requests(&remote.take_outgoing());
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], Request::ClearDomain);
        let Request::ApplyDelta { transform } = &sent[1] else {
            panic!("expected a delta");
        };
        assert!(transform.translation.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1.0e-3));
        assert_eq!(*remote.session().network_delta(), Transform::ZERO_DELTA);
    }

    #[test]
    fn test_mirror_ignores_pointer() {
        let (mut scene, _, roots) = scene_with(1);
        let mut mirror = replicated(Role::Remote, false);
        mirror.session_mut().select_node(&mut scene, roots[0], false);
        mirror.session_mut().set_domain(TransformationDomain::XAxis);
        let frame = FrameInput {
            camera_location: Vec3::new(0.0, 0.0, 10.0),
            camera_forward: Vec3::NEG_Z,
            fov_degrees: 90.0,
            cursor_ray: Some((Vec3::new(2.0, 0.0, 10.0), Vec3::NEG_Z)),
        };
        assert_eq!(mirror.frame(&mut scene, &frame), Transform::ZERO_DELTA);
    }
}
