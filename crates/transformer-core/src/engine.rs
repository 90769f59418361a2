//! Transform resolution: from pointer rays to per-target world transforms,
//! and from scene traces to selection or gizmo domains.

use crate::domain::Granularity;
use crate::math::Transform;
use crate::scene::{EntityId, Hit, HitTarget, NodeId, Scene, TraceFilter};
use crate::session::ManipulationSession;
use glam::Vec3;

/// Per-frame input for [`ManipulationSession::tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub camera_location: Vec3,
    pub camera_forward: Vec3,
    pub fov_degrees: f32,
    /// Pointer ray (origin, direction) when this participant drives the
    /// gizmo.
    pub cursor_ray: Option<(Vec3, Vec3)>,
}

impl ManipulationSession {
    /// Turn the pointer ray into a delta, snap it, and apply it to every
    /// selected member. Returns the delta that was applied, or the zero
    /// delta when nothing is being manipulated.
    pub fn update_transform<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        view_forward: Vec3,
        ray_origin: Vec3,
        ray_direction: Vec3,
    ) -> Transform {
        let domain = self.domain;
        if domain.is_none() {
            return Transform::ZERO_DELTA;
        }
        let Some(gizmo) = self.gizmo.as_mut() else {
            return Transform::ZERO_DELTA;
        };

        let ray_end = ray_origin + ray_direction.normalize_or_zero() * self.config.trace_distance;
        let raw = gizmo.compute_delta(view_forward, ray_origin, ray_end, domain);
        let delta = match self.config.snapping.increment_for(self.kind) {
            Some(increment) => gizmo.snap(&mut self.accumulated_delta, &raw, domain, increment),
            None => raw,
        };
        self.apply_delta_transform(scene, &delta);
        delta
    }

    /// Apply a delta to every selected member, relative to the gizmo.
    ///
    /// Rotation is composed onto each member. Translation moves each member's
    /// offset from the gizmo, rotated along unless rotating on local axes.
    /// Scale is expressed in each member's own frame. Members that are not
    /// movable are skipped unless mobility is forced.
    pub fn apply_delta_transform<S: Scene + ?Sized>(&mut self, scene: &mut S, delta: &Transform) {
        let Some(gizmo) = self.gizmo.as_ref() else {
            log::debug!("No gizmo, ignoring delta");
            return;
        };
        let pivot = gizmo.location();
        let domain = self.domain;
        let increment = self.config.snapping.increment_for(self.kind);

        let targets: Vec<NodeId> = self.selection.iter().collect();
        for node in targets {
            let Some((current, movable)) = scene.node(node).map(|n| (n.transform, n.movable)) else {
                log::warn!("Selected node {} is missing from the scene", node);
                continue;
            };
            if !movable && !self.config.force_mobility {
                log::warn!("Node {} is not movable, skipping", node);
                continue;
            }

            let mut offset = current.translation - pivot;
            if !self.config.rotate_on_local_axis {
                offset = delta.rotation * offset;
            }
            let mut candidate = Transform {
                translation: offset + pivot + delta.translation,
                rotation: (delta.rotation * current.rotation).normalize(),
                scale: current.rotation.inverse() * delta.scale + current.scale,
            };
            if let (Some(increment), Some(gizmo)) = (increment, self.gizmo.as_ref()) {
                candidate = gizmo.snap_target(&current, &candidate, domain, increment);
            }

            scene.set_movable(node, true);
            self.set_transform(scene, node, candidate);
        }
        self.follow_attached(&*scene);
    }

    /// Move one node, running its focus hooks first if it has them.
    pub fn set_transform<S: Scene + ?Sized>(&self, scene: &mut S, node: NodeId, transform: Transform) {
        let target = self.focus_target(&*scene, node);
        let hook = match target {
            Some(target) => scene.focusable(target).map(|handler| {
                handler.on_new_transform(self.id, node, &transform, self.config.granularity)
            }),
            None => None,
        };
        match hook {
            Some(self_moved) => {
                if let Some(own) = self_moved {
                    scene.set_world_transform(node, own);
                }
                if self.config.transform_focusables {
                    scene.set_world_transform(node, transform);
                }
            }
            None => {
                scene.set_world_transform(node, transform);
            }
        }
    }

    /// Drop hits on non-replicated members when configured to. Gizmo hits
    /// are always kept.
    pub fn filter_hits<S: Scene + ?Sized>(&self, scene: &S, hits: &mut Vec<Hit>) {
        if !self.config.ignore_non_replicated {
            return;
        }
        let granularity = self.config.granularity;
        hits.retain(|hit| match hit.target {
            HitTarget::Gizmo { .. } => true,
            HitTarget::Node { node, .. } => {
                let keep = scene.is_replicated(node, granularity);
                if !keep {
                    log::warn!("Ignoring hit on non-replicated node {}", node);
                }
                keep
            }
        });
    }

    /// Resolve trace hits: a hit on this session's gizmo starts a
    /// manipulation in the matching domain; otherwise the first scene hit is
    /// selected, or every scene hit when appending. Hits on other gizmos are
    /// skipped. Returns whether anything
    /// was resolved.
    pub fn handle_traced_objects<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        hits: &[Hit],
        append: bool,
    ) -> bool {
        self.clear_domain();

        if let Some(gizmo) = self.gizmo.as_ref() {
            let own = gizmo.id();
            let domain = hits.iter().find_map(|hit| match hit.target {
                HitTarget::Gizmo { gizmo: id, part } if id == own => {
                    Some(gizmo.detect_domain(part)).filter(|d| d.is_active())
                }
                _ => None,
            });
            if let Some(domain) = domain {
                self.set_domain(domain);
                return true;
            }
        }

        // other gizmos are never selectable
        let scene_hits: Vec<(EntityId, NodeId)> = hits
            .iter()
            .filter_map(|hit| match hit.target {
                HitTarget::Node { entity, node } => Some((entity, node)),
                HitTarget::Gizmo { .. } => None,
            })
            .collect();
        let Some(&(entity, node)) = scene_hits.first() else {
            return false;
        };

        match (self.config.granularity, append) {
            (Granularity::Part, false) => self.select_node(scene, node, false),
            (Granularity::Entity, false) => self.select_entity(scene, entity, false),
            (Granularity::Part, true) => {
                let mut nodes: Vec<NodeId> = Vec::new();
                for (_, node) in &scene_hits {
                    if !nodes.contains(node) {
                        nodes.push(*node);
                    }
                }
                self.select_nodes(scene, &nodes, true);
            }
            (Granularity::Entity, true) => {
                let mut entities: Vec<EntityId> = Vec::new();
                for (entity, _) in &scene_hits {
                    if !entities.contains(entity) {
                        entities.push(*entity);
                    }
                }
                self.select_entities(scene, &entities, true);
            }
        }
        true
    }

    /// Trace the segment `start..end` against the scene and this session's
    /// gizmo, then resolve the hits.
    pub fn trace<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        start: Vec3,
        end: Vec3,
        filter: &TraceFilter,
        append: bool,
    ) -> bool {
        let mut hits = scene.ray_cast(start, end, filter);
        if let Some(gizmo) = self.gizmo.as_ref() {
            if !filter.ignored_gizmos.contains(&gizmo.id()) {
                if let Some(hit) = gizmo.pick(start, end) {
                    let index = hits.partition_point(|h| h.distance <= hit.distance);
                    hits.insert(index, hit);
                }
            }
        }
        self.filter_hits(&*scene, &mut hits);
        if hits.is_empty() {
            return false;
        }
        self.handle_traced_objects(scene, &hits, append)
    }

    /// Trace along a pointer ray. A miss without `append` clears the
    /// selection.
    pub fn mouse_trace<S: Scene + ?Sized>(
        &mut self,
        scene: &mut S,
        origin: Vec3,
        direction: Vec3,
        filter: &TraceFilter,
        append: bool,
    ) -> bool {
        let end = origin + direction.normalize_or_zero() * self.config.trace_distance;
        let resolved = self.trace(scene, origin, end, filter, append);
        if !resolved && !append {
            self.deselect_all(scene, false);
        }
        resolved
    }

    /// Per-frame update. Drives the gizmo from the cursor ray (if any),
    /// folds the applied delta into the network delta, and keeps the gizmo
    /// sized and oriented for the view. Returns the delta applied this frame.
    pub fn tick<S: Scene + ?Sized>(&mut self, scene: &mut S, frame: &FrameInput) -> Transform {
        if self.gizmo.is_none() {
            return Transform::ZERO_DELTA;
        }
        let mut delta = Transform::ZERO_DELTA;
        if let Some((origin, direction)) = frame.cursor_ray {
            delta = self.update_transform(scene, frame.camera_forward, origin, direction);
            self.network_delta = self.network_delta.accumulate(&delta);
        }

        let space = self.space;
        let attached_rotation = self
            .gizmo
            .as_ref()
            .and_then(|g| g.attached_to())
            .and_then(|n| scene.world_transform(n))
            .map(|t| t.rotation)
            .unwrap_or_default();
        if let Some(gizmo) = self.gizmo.as_mut() {
            gizmo.scale_for_view(frame.camera_location, frame.camera_forward, frame.fov_degrees);
            gizmo.update_space(space, attached_rotation);
        }
        delta
    }

    /// Reset the network delta after it has been committed.
    pub fn reset_network_delta(&mut self) {
        self.network_delta.reset_delta();
    }
}
