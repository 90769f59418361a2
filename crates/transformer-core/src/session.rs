//! Manipulation session: selection, gizmo lifecycle and session settings.
//!
//! A session belongs to one participant. It owns the selection set, the
//! active gizmo and the current transformation domain, and talks to the
//! scene only through the [`Scene`] trait. Transform resolution lives in
//! `engine.rs`, cloning in `clone.rs`.

use crate::config::SessionConfig;
use crate::domain::{
    GizmoPlacement, Granularity, SpaceType, TransformationDomain, TransformationKind,
};
use crate::gizmo::Gizmo;
use crate::math::Transform;
use crate::scene::{EntityId, FocusTarget, GizmoId, NodeId, Scene, SessionId};
use crate::selection::{AcceptAll, SelectionPolicy, SelectionSet};
use std::time::Duration;

/// Why a replication loop gave up waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesyncReason {
    /// Cloned nodes never became known to remote participants.
    UnreplicatedClones { pending: usize },
    /// The replicated selection never matched the authoritative one.
    SelectionMismatch,
}

/// Notifications emitted by a session, drained with
/// [`ManipulationSession::take_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A node joined or left the selection. `focusable` tells whether the
    /// node (or its owner) implements the focus hooks.
    SelectionChanged {
        node: NodeId,
        selected: bool,
        focusable: bool,
    },
    GizmoSpawned {
        gizmo: GizmoId,
        kind: TransformationKind,
    },
    GizmoDestroyed {
        gizmo: GizmoId,
    },
    GizmoStateChanged {
        gizmo: GizmoId,
        in_progress: bool,
        domain: TransformationDomain,
    },
    DesyncWarning {
        reason: DesyncReason,
        waited: Duration,
    },
}

/// One participant's manipulation state.
pub struct ManipulationSession {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) selection: SelectionSet,
    pub(crate) gizmo: Option<Gizmo>,
    pub(crate) kind: TransformationKind,
    pub(crate) space: SpaceType,
    pub(crate) domain: TransformationDomain,
    /// Sub-increment motion carried between frames while snapping.
    pub(crate) accumulated_delta: Transform,
    /// Motion since the last replicated commit.
    pub(crate) network_delta: Transform,
    policy: Box<dyn SelectionPolicy>,
    events: Vec<SessionEvent>,
}

impl ManipulationSession {
    /// Create a session with a fresh id.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_id(SessionId::new(), config)
    }

    pub fn with_id(id: SessionId, config: SessionConfig) -> Self {
        Self {
            id,
            kind: config.initial_kind,
            space: config.initial_space,
            config,
            selection: SelectionSet::new(),
            gizmo: None,
            domain: TransformationDomain::None,
            accumulated_delta: Transform::ZERO_DELTA,
            network_delta: Transform::ZERO_DELTA,
            policy: Box::new(AcceptAll),
            events: Vec::new(),
        }
    }

    pub fn set_selection_policy(&mut self, policy: Box<dyn SelectionPolicy>) {
        self.policy = policy;
    }

    // --- Accessors ---

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    /// Selected nodes in order, plus the node the gizmo is attached to.
    pub fn selected(&self) -> (&[NodeId], Option<NodeId>) {
        (
            self.selection.as_slice(),
            self.gizmo.as_ref().and_then(|g| g.attached_to()),
        )
    }

    pub fn gizmo(&self) -> Option<&Gizmo> {
        self.gizmo.as_ref()
    }

    pub fn kind(&self) -> TransformationKind {
        self.kind
    }

    pub fn space(&self) -> SpaceType {
        self.space
    }

    pub fn domain(&self) -> TransformationDomain {
        self.domain
    }

    pub fn granularity(&self) -> Granularity {
        self.config.granularity
    }

    pub fn accumulated_delta(&self) -> &Transform {
        &self.accumulated_delta
    }

    pub fn network_delta(&self) -> &Transform {
        &self.network_delta
    }

    /// Drain pending notifications.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    // --- Selection ---

    /// Select a single node. Without `append`, the previous selection is
    /// cleared first.
    pub fn select_node<S: Scene + ?Sized>(&mut self, scene: &mut S, node: NodeId, append: bool) {
        let Some(entity) = scene.owner(node) else {
            log::warn!("Cannot select {}: not in the scene", node);
            return;
        };
        self.select_resolved(scene, entity, node, append);
    }

    /// Select an entity through its root node.
    pub fn select_entity<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        entity: EntityId,
        append: bool,
    ) {
        let Some(root) = scene.root_of(entity) else {
            log::warn!("Cannot select entity {}: not in the scene", entity);
            return;
        };
        self.select_resolved(scene, entity, root, append);
    }

    fn select_resolved<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        entity: EntityId,
        node: NodeId,
        append: bool,
    ) {
        if !self.policy.should_select(entity, node) {
            log::debug!("Selection policy rejected {}", node);
            return;
        }
        let before = self.selection.clone();
        if !append {
            self.clear_selection(scene);
        }
        self.add_to_selection(scene, node);
        self.finish_selection_update(scene, &before);
    }

    /// Select several nodes. Missing or rejected candidates are skipped; the
    /// previous selection is only cleared once a valid candidate is found.
    pub fn select_nodes<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        nodes: &[NodeId],
        append: bool,
    ) {
        let candidates: Vec<(EntityId, NodeId)> = nodes
            .iter()
            .filter_map(|node| match scene.owner(*node) {
                Some(entity) => Some((entity, *node)),
                None => {
                    log::warn!("Cannot select {}: not in the scene", node);
                    None
                }
            })
            .collect();
        self.select_candidates(scene, &candidates, append);
    }

    /// Select several entities through their root nodes.
    pub fn select_entities<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        entities: &[EntityId],
        append: bool,
    ) {
        let candidates: Vec<(EntityId, NodeId)> = entities
            .iter()
            .filter_map(|entity| match scene.root_of(*entity) {
                Some(root) => Some((*entity, root)),
                None => {
                    log::warn!("Cannot select entity {}: not in the scene", entity);
                    None
                }
            })
            .collect();
        self.select_candidates(scene, &candidates, append);
    }

    fn select_candidates<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        candidates: &[(EntityId, NodeId)],
        append: bool,
    ) {
        let before = self.selection.clone();
        let mut any_valid = false;
        for &(entity, node) in candidates {
            if !self.policy.should_select(entity, node) {
                continue;
            }
            if !any_valid && !append {
                self.clear_selection(scene);
            }
            any_valid = true;
            self.add_to_selection(scene, node);
        }
        if any_valid {
            self.finish_selection_update(scene, &before);
        }
    }

    pub fn deselect_node<S: Scene + ?Sized>(&mut self, scene: &mut S, node: NodeId) {
        let Some(index) = self.selection.position(node) else {
            return;
        };
        let before = self.selection.clone();
        self.deselect_at(scene, index);
        self.finish_selection_update(scene, &before);
    }

    pub fn deselect_entity<S: Scene + ?Sized>(&mut self, scene: &mut S, entity: EntityId) {
        if let Some(root) = scene.root_of(entity) {
            self.deselect_node(scene, root);
        }
    }

    /// Clear the selection. With `destroy`, the cleared members are removed
    /// from the scene afterwards: the part alone for multi-part entities at
    /// part granularity, the whole entity otherwise. Returns the members
    /// that were selected.
    pub fn deselect_all<S: Scene + ?Sized>(&mut self, scene: &mut S, destroy: bool) -> Vec<NodeId> {
        let before = self.selection.clone();
        let cleared = self.clear_selection(scene);
        self.finish_selection_update(scene, &before);

        if destroy {
            for node in &cleared {
                let Some(entity) = scene.owner(*node) else {
                    continue;
                };
                if self.config.granularity == Granularity::Part && scene.part_count(entity) > 1 {
                    log::debug!("Destroying part {}", node);
                    scene.destroy_part(*node);
                } else {
                    log::debug!("Destroying entity {}", entity);
                    scene.destroy_entity(entity);
                }
            }
        }
        cleared
    }

    /// Add `node`, or toggle it off when already selected and toggling is on.
    fn add_to_selection<S: Scene + ?Sized>(&mut self, scene: &mut S, node: NodeId) {
        if let Some(index) = self.selection.position(node) {
            if self.config.toggle_selected_in_multi_selection {
                self.deselect_at(scene, index);
            }
            return;
        }
        self.selection.push(node);
        let focusable = self.notify_focus(scene, node, true);
        self.events.push(SessionEvent::SelectionChanged {
            node,
            selected: true,
            focusable,
        });
    }

    fn deselect_at<S: Scene + ?Sized>(&mut self, scene: &mut S, index: usize) {
        let Some(node) = self.selection.remove_at(index) else {
            return;
        };
        let focusable = self.notify_focus(scene, node, false);
        self.events.push(SessionEvent::SelectionChanged {
            node,
            selected: false,
            focusable,
        });
    }

    /// Remove every member with notifications, leaving gizmo placement alone.
    fn clear_selection<S: Scene + ?Sized>(&mut self, scene: &mut S) -> Vec<NodeId> {
        let cleared = self.selection.as_slice().to_vec();
        for node in &cleared {
            let focusable = self.notify_focus(scene, *node, false);
            self.events.push(SessionEvent::SelectionChanged {
                node: *node,
                selected: false,
                focusable,
            });
        }
        self.selection.clear();
        cleared
    }

    fn finish_selection_update<S: Scene + ?Sized>(&mut self, scene: &mut S, before: &SelectionSet) {
        if &self.selection != before {
            self.cancel_manipulation();
        }
        self.update_gizmo_placement(scene);
    }

    pub(crate) fn focus_target<S: Scene + ?Sized>(&self, scene: &S, node: NodeId) -> Option<FocusTarget> {
        match self.config.granularity {
            Granularity::Entity => scene.owner(node).map(FocusTarget::Entity),
            Granularity::Part => Some(FocusTarget::Part(node)),
        }
    }

    /// Run the focus hooks. Returns whether the target implements them.
    fn notify_focus<S: Scene + ?Sized>(&self, scene: &mut S, node: NodeId, focused: bool) -> bool {
        let Some(target) = self.focus_target(&*scene, node) else {
            return false;
        };
        let granularity = self.config.granularity;
        match scene.focusable(target) {
            Some(handler) => {
                if focused {
                    handler.focus(self.id, node, granularity);
                } else {
                    handler.unfocus(self.id, node, granularity);
                }
                true
            }
            None => false,
        }
    }

    // --- Gizmo ---

    /// Spawn, keep or destroy the gizmo to match the selection and kind,
    /// then attach it to the configured member.
    pub fn update_gizmo_placement<S: Scene + ?Sized>(&mut self, scene: &mut S) {
        self.sync_gizmo();

        let attach = match self.config.placement {
            GizmoPlacement::OnFirstSelection => self.selection.first(),
            GizmoPlacement::OnLastSelection => self.selection.last(),
        };
        let (Some(gizmo), Some(node)) = (self.gizmo.as_mut(), attach) else {
            return;
        };
        let Some(world) = scene.world_transform(node) else {
            log::warn!("Gizmo target {} is missing from the scene", node);
            return;
        };
        gizmo.attach_to(node, &world);
        gizmo.update_space(self.space, world.rotation);
    }

    fn sync_gizmo(&mut self) {
        if self.selection.is_empty() {
            self.destroy_gizmo();
            return;
        }
        if self.gizmo.as_ref().is_some_and(|g| g.kind() == self.kind) {
            return;
        }
        self.destroy_gizmo();
        self.gizmo = Gizmo::for_kind(self.kind);
        if let Some(gizmo) = &self.gizmo {
            log::debug!("Spawned {:?} gizmo {}", self.kind, gizmo.id());
            self.events.push(SessionEvent::GizmoSpawned {
                gizmo: gizmo.id(),
                kind: self.kind,
            });
        }
    }

    fn destroy_gizmo(&mut self) {
        if let Some(gizmo) = self.gizmo.take() {
            log::debug!("Destroyed gizmo {}", gizmo.id());
            self.events.push(SessionEvent::GizmoDestroyed { gizmo: gizmo.id() });
        }
    }

    /// Move the gizmo onto its attached node's current transform.
    pub(crate) fn follow_attached<S: Scene + ?Sized>(&mut self, scene: &S) {
        let Some(gizmo) = self.gizmo.as_mut() else {
            return;
        };
        if let Some(world) = gizmo.attached_to().and_then(|n| scene.world_transform(n)) {
            gizmo.follow(&world);
        }
    }

    pub(crate) fn set_gizmo_progress(&mut self, in_progress: bool) {
        let domain = self.domain;
        let Some(gizmo) = self.gizmo.as_mut() else {
            return;
        };
        if gizmo.set_progress_state(in_progress, domain) {
            self.events.push(SessionEvent::GizmoStateChanged {
                gizmo: gizmo.id(),
                in_progress,
                domain,
            });
        }
    }

    // --- Domain ---

    /// Start (or stop, with `None`) constraining manipulation to `domain`.
    pub fn set_domain(&mut self, domain: TransformationDomain) {
        if domain.is_active() && (self.gizmo.is_none() || self.selection.is_empty()) {
            log::warn!("Ignoring domain {:?}: nothing to manipulate", domain);
            return;
        }
        self.domain = domain;
        if domain.is_none() {
            self.accumulated_delta.reset_delta();
        }
        self.set_gizmo_progress(domain.is_active());
    }

    pub fn clear_domain(&mut self) {
        self.set_domain(TransformationDomain::None);
    }

    fn cancel_manipulation(&mut self) {
        if self.domain.is_active() || self.gizmo.as_ref().is_some_and(|g| g.in_progress()) {
            log::debug!("Selection or kind changed, cancelling {:?} manipulation", self.domain);
            self.clear_domain();
        }
    }

    // --- Settings ---

    pub fn set_space<S: Scene + ?Sized>(&mut self, scene: &mut S, space: SpaceType) {
        self.space = space;
        let Some(gizmo) = self.gizmo.as_mut() else {
            return;
        };
        let rotation = gizmo
            .attached_to()
            .and_then(|n| scene.world_transform(n))
            .map(|t| t.rotation)
            .unwrap_or_default();
        gizmo.update_space(space, rotation);
    }

    /// Switch gizmo kind. Setting the current kind does nothing.
    pub fn set_transformation_kind<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        kind: TransformationKind,
    ) {
        if kind == self.kind {
            return;
        }
        if kind == TransformationKind::NoTransform {
            log::warn!("Transformation kind set to NoTransform, no gizmo will be shown");
        }
        self.cancel_manipulation();
        self.kind = kind;
        self.accumulated_delta.reset_delta();
        self.update_gizmo_placement(scene);
    }

    /// Switch between entity and part selection, reselecting what was
    /// selected at the new granularity.
    pub fn set_granularity<S: Scene + ?Sized>(&mut self, scene: &mut S, granularity: Granularity) {
        if granularity == self.config.granularity {
            return;
        }
        let previous = self.deselect_all(scene, false);
        self.config.granularity = granularity;
        match granularity {
            Granularity::Part => self.select_nodes(scene, &previous, true),
            Granularity::Entity => {
                let mut owners: Vec<EntityId> = Vec::new();
                for entity in previous.iter().filter_map(|n| scene.owner(*n)) {
                    if !owners.contains(&entity) {
                        owners.push(entity);
                    }
                }
                self.select_entities(scene, &owners, true);
            }
        }
    }

    pub fn set_placement<S: Scene + ?Sized>(&mut self, scene: &mut S, placement: GizmoPlacement) {
        self.config.placement = placement;
        self.update_gizmo_placement(scene);
    }

    pub fn set_rotate_on_local_axis(&mut self, enabled: bool) {
        self.config.rotate_on_local_axis = enabled;
    }

    pub fn set_force_mobility(&mut self, enabled: bool) {
        self.config.force_mobility = enabled;
    }

    pub fn set_toggle_selected(&mut self, enabled: bool) {
        self.config.toggle_selected_in_multi_selection = enabled;
    }

    pub fn set_transform_focusables(&mut self, enabled: bool) {
        self.config.transform_focusables = enabled;
    }

    pub fn set_ignore_non_replicated(&mut self, enabled: bool) {
        self.config.ignore_non_replicated = enabled;
    }

    pub fn set_snapping_enabled(&mut self, kind: TransformationKind, enabled: bool) {
        self.config.snapping.set_enabled(kind, enabled);
    }

    pub fn set_snapping_value(&mut self, kind: TransformationKind, increment: f32) {
        if !(increment > 0.0 && increment.is_finite()) {
            log::warn!("Ignoring snapping increment {} for {:?}", increment, kind);
            return;
        }
        self.config.snapping.set_increment(kind, increment);
    }

    /// Dump the selection to the log.
    pub fn log_selection<S: Scene + ?Sized>(&self, scene: &S) {
        log::info!(
            "Session {}: {} selected, kind {:?}, domain {:?}",
            self.id,
            self.selection.len(),
            self.kind,
            self.domain
        );
        for (index, node) in self.selection.iter().enumerate() {
            match scene.node(node) {
                Some(n) => log::info!("  [{}] {} ({}) of {}", index, n.name, node, n.entity),
                None => log::info!("  [{}] [INVALID] {}", index, node),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::math::Transform;
    use crate::scene::{Focusable, MemoryScene};
    use glam::Vec3;
    use std::sync::{Arc, Mutex};

    /// Counts focus hook calls.
    #[derive(Clone, Default)]
    pub(crate) struct FocusCounter {
        pub(crate) focused: Arc<Mutex<i32>>,
        pub(crate) moved: Arc<Mutex<Vec<Transform>>>,
    }

    impl Focusable for FocusCounter {
        fn focus(&mut self, _: SessionId, _: NodeId, _: Granularity) {
            *self.focused.lock().unwrap() += 1;
        }

        fn unfocus(&mut self, _: SessionId, _: NodeId, _: Granularity) {
            *self.focused.lock().unwrap() -= 1;
        }

        fn on_new_transform(
            &mut self,
            _: SessionId,
            _: NodeId,
            transform: &Transform,
            _: Granularity,
        ) -> Option<Transform> {
            self.moved.lock().unwrap().push(*transform);
            None
        }
    }

    pub(crate) fn scene_with(count: usize) -> (MemoryScene, Vec<EntityId>, Vec<NodeId>) {
        let mut scene = MemoryScene::new();
        let mut entities = Vec::new();
        let mut roots = Vec::new();
        for i in 0..count {
            let (entity, root) = scene.spawn_entity(
                &format!("entity{}", i),
                Transform::from_translation(Vec3::new(i as f32 * 3.0, 0.0, 0.0)),
            );
            entities.push(entity);
            roots.push(root);
        }
        scene.take_changes();
        (scene, entities, roots)
    }

    #[test]
    fn test_select_spawns_and_attaches_gizmo() {
        let (mut scene, _, roots) = scene_with(2);
        let mut session = ManipulationSession::new(SessionConfig::default());

        session.select_node(&mut scene, roots[0], false);
        session.select_node(&mut scene, roots[1], true);
        assert_eq!(session.selection().as_slice(), &[roots[0], roots[1]]);

        let gizmo = session.gizmo().unwrap();
        assert_eq!(gizmo.kind(), TransformationKind::Translation);
        // attached to the last selection by default
        assert_eq!(gizmo.attached_to(), Some(roots[1]));
        assert!(gizmo.location().abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1.0e-6));
        assert_eq!(session.selected(), (&[roots[0], roots[1]][..], Some(roots[1])));
    }

    #[test]
    fn test_select_without_append_replaces() {
        let (mut scene, _, roots) = scene_with(2);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);
        session.select_node(&mut scene, roots[1], false);
        assert_eq!(session.selection().as_slice(), &[roots[1]]);
    }

    #[test]
    fn test_toggle_reselect() {
        let (mut scene, _, roots) = scene_with(1);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], true);
        session.select_node(&mut scene, roots[0], true);
        assert!(session.selection().is_empty());
        assert!(session.gizmo().is_none());

        session.set_toggle_selected(false);
        session.select_node(&mut scene, roots[0], true);
        session.select_node(&mut scene, roots[0], true);
        assert_eq!(session.selection().len(), 1);
    }

    #[test]
    fn test_reselect_without_append_keeps_node() {
        let (mut scene, _, roots) = scene_with(1);
        let mut session = ManipulationSession::new(SessionConfig::default());
        assert!(session.config().toggle_selected_in_multi_selection);
        session.select_node(&mut scene, roots[0], false);
        session.select_node(&mut scene, roots[0], false);
        // the selection is cleared before adding, so nothing toggles off
        assert_eq!(session.selection().as_slice(), &[roots[0]]);
        assert!(session.gizmo().is_some());
    }

    #[test]
    fn test_focus_balance_matches_selection() {
        let (mut scene, entities, roots) = scene_with(3);
        let counter = FocusCounter::default();
        for entity in &entities {
            scene.register_focusable(FocusTarget::Entity(*entity), Box::new(counter.clone()));
        }
        let mut session = ManipulationSession::new(SessionConfig::default());

        session.select_nodes(&mut scene, &roots, false);
        assert_eq!(*counter.focused.lock().unwrap(), 3);
        session.select_node(&mut scene, roots[1], true);
        session.select_node(&mut scene, roots[0], false);
        session.select_nodes(&mut scene, &[roots[2], roots[0]], true);
        assert_eq!(
            *counter.focused.lock().unwrap(),
            session.selection().len() as i32
        );

        let events = session.take_events();
        let on = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::SelectionChanged { selected: true, .. }))
            .count();
        let off = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::SelectionChanged { selected: false, .. }))
            .count();
        assert_eq!(on - off, session.selection().len());
        assert!(events.iter().all(|e| match e {
            SessionEvent::SelectionChanged { focusable, .. } => *focusable,
            _ => true,
        }));
    }

    #[test]
    fn test_select_missing_node_is_noop() {
        let (mut scene, _, roots) = scene_with(1);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);
        session.select_node(&mut scene, NodeId::new(), false);
        assert_eq!(session.selection().as_slice(), &[roots[0]]);
    }

    #[test]
    fn test_select_multiple_skips_invalid_without_clearing() {
        let (mut scene, _, roots) = scene_with(2);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);

        // nothing valid: previous selection survives
        session.select_nodes(&mut scene, &[NodeId::new()], false);
        assert_eq!(session.selection().as_slice(), &[roots[0]]);

        session.select_nodes(&mut scene, &[NodeId::new(), roots[1]], false);
        assert_eq!(session.selection().as_slice(), &[roots[1]]);
    }

    #[test]
    fn test_selection_policy() {
        let (mut scene, entities, roots) = scene_with(2);
        let blocked = entities[0];
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.set_selection_policy(Box::new(move |entity: EntityId, _: NodeId| entity != blocked));
        session.select_nodes(&mut scene, &roots, false);
        assert_eq!(session.selection().as_slice(), &[roots[1]]);
    }

    #[test]
    fn test_deselect_all_destroys_entities_and_gizmo() {
        let (mut scene, entities, roots) = scene_with(2);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_nodes(&mut scene, &roots, false);
        assert!(session.gizmo().is_some());

        let cleared = session.deselect_all(&mut scene, true);
        assert_eq!(cleared, roots);
        assert!(session.selection().is_empty());
        assert!(session.gizmo().is_none());
        assert!(!scene.contains_entity(entities[0]));
        assert!(!scene.contains_entity(entities[1]));
    }

    #[test]
    fn test_deselect_all_part_granularity_destroys_parts_only() {
        let (mut scene, entities, roots) = scene_with(1);
        let arm = scene
            .add_part(entities[0], roots[0], "arm", Transform::IDENTITY)
            .unwrap();
        let config = SessionConfig {
            granularity: Granularity::Part,
            ..SessionConfig::default()
        };
        let mut session = ManipulationSession::new(config);
        session.select_node(&mut scene, arm, false);
        session.deselect_all(&mut scene, true);
        assert!(!scene.contains(arm));
        assert!(scene.contains_entity(entities[0]));
    }

    #[test]
    fn test_first_selection_placement() {
        let (mut scene, _, roots) = scene_with(2);
        let config = SessionConfig {
            placement: GizmoPlacement::OnFirstSelection,
            ..SessionConfig::default()
        };
        let mut session = ManipulationSession::new(config);
        session.select_nodes(&mut scene, &roots, false);
        assert_eq!(session.gizmo().unwrap().attached_to(), Some(roots[0]));

        session.set_placement(&mut scene, GizmoPlacement::OnLastSelection);
        assert_eq!(session.gizmo().unwrap().attached_to(), Some(roots[1]));
    }

    #[test]
    fn test_domain_reset_clears_accumulated() {
        let (mut scene, _, roots) = scene_with(1);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);
        session.set_domain(TransformationDomain::XAxis);
        assert!(session.gizmo().unwrap().in_progress());

        session.accumulated_delta.translation = Vec3::new(0.4, 0.0, 0.0);
        session.set_domain(TransformationDomain::None);
        assert_eq!(*session.accumulated_delta(), Transform::ZERO_DELTA);
        assert!(!session.gizmo().unwrap().in_progress());
    }

    #[test]
    fn test_domain_requires_gizmo() {
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.set_domain(TransformationDomain::XAxis);
        assert!(session.domain().is_none());
    }

    #[test]
    fn test_kind_change_resets_and_respawns() {
        let (mut scene, _, roots) = scene_with(1);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);
        session.set_domain(TransformationDomain::XAxis);
        session.accumulated_delta.translation = Vec3::new(0.4, 0.0, 0.0);
        let first = session.gizmo().unwrap().id();

        session.set_transformation_kind(&mut scene, TransformationKind::Rotation);
        assert_eq!(*session.accumulated_delta(), Transform::ZERO_DELTA);
        assert!(session.domain().is_none());
        let gizmo = session.gizmo().unwrap();
        assert_eq!(gizmo.kind(), TransformationKind::Rotation);
        assert_ne!(gizmo.id(), first);
        assert_eq!(gizmo.attached_to(), Some(roots[0]));

        let events = session.take_events();
        assert!(events.contains(&SessionEvent::GizmoDestroyed { gizmo: first }));
    }

    #[test]
    fn test_same_kind_is_noop() {
        let (mut scene, _, roots) = scene_with(1);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);
        session.set_domain(TransformationDomain::YAxis);
        let id = session.gizmo().unwrap().id();
        session.set_transformation_kind(&mut scene, TransformationKind::Translation);
        assert_eq!(session.gizmo().unwrap().id(), id);
        assert_eq!(session.domain(), TransformationDomain::YAxis);
    }

    #[test]
    fn test_no_transform_kind_has_no_gizmo() {
        let (mut scene, _, roots) = scene_with(1);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);
        session.set_transformation_kind(&mut scene, TransformationKind::NoTransform);
        assert!(session.gizmo().is_none());
        assert_eq!(session.selection().len(), 1);
    }

    #[test]
    fn test_selection_change_cancels_manipulation() {
        let (mut scene, _, roots) = scene_with(2);
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);
        session.set_domain(TransformationDomain::ZAxis);
        session.select_node(&mut scene, roots[1], true);
        assert!(session.domain().is_none());
    }

    #[test]
    fn test_granularity_switch_reselects() {
        let (mut scene, entities, roots) = scene_with(1);
        let arm = scene
            .add_part(entities[0], roots[0], "arm", Transform::IDENTITY)
            .unwrap();
        let config = SessionConfig {
            granularity: Granularity::Part,
            ..SessionConfig::default()
        };
        let mut session = ManipulationSession::new(config);
        session.select_nodes(&mut scene, &[arm, roots[0]], false);
        assert_eq!(session.selection().len(), 2);

        // both parts share an owner: the entity is selected once
        session.set_granularity(&mut scene, Granularity::Entity);
        assert_eq!(session.selection().as_slice(), &[roots[0]]);
    }

    #[test]
    fn test_space_follows_attached_rotation() {
        let (mut scene, _, roots) = scene_with(1);
        let rotation = glam::Quat::from_rotation_y(0.5);
        scene.set_world_transform(roots[0], Transform::IDENTITY.with_rotation(rotation));
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.select_node(&mut scene, roots[0], false);
        assert_eq!(session.gizmo().unwrap().anchor().rotation, glam::Quat::IDENTITY);
        session.set_space(&mut scene, SpaceType::Local);
        assert!(session.gizmo().unwrap().anchor().rotation.abs_diff_eq(rotation, 1.0e-6));
    }

    #[test]
    fn test_invalid_snapping_increment_ignored() {
        let mut session = ManipulationSession::new(SessionConfig::default());
        session.set_snapping_enabled(TransformationKind::Translation, true);
        session.set_snapping_value(TransformationKind::Translation, -2.0);
        assert_eq!(
            session.config().snapping.increment_for(TransformationKind::Translation),
            None
        );
        session.set_snapping_value(TransformationKind::Translation, 2.0);
        assert_eq!(
            session.config().snapping.increment_for(TransformationKind::Translation),
            Some(2.0)
        );
    }
}
