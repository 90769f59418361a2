//! In-memory scene implementation.

use super::{
    EntityId, FocusTarget, Focusable, Hit, HitTarget, LayerMask, NodeId, Scene, SceneNode,
    TraceFilter,
};
use crate::domain::Granularity;
use crate::math::{Transform, ray_sphere};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_RADIUS: f32 = 0.5;

/// An entity and the ids of its parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntity {
    pub id: EntityId,
    pub name: String,
    pub root: NodeId,
    /// All parts, root first.
    pub parts: Vec<NodeId>,
    pub replicated: bool,
}

/// Full copy of a scene, sent to participants when they join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub entities: Vec<SceneEntity>,
    pub nodes: Vec<SceneNode>,
}

/// A mutation recorded by [`MemoryScene`], replayable on a replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneChange {
    EntitySpawned {
        entity: SceneEntity,
        nodes: Vec<SceneNode>,
    },
    PartSpawned {
        node: SceneNode,
    },
    Attached {
        child: NodeId,
        parent: NodeId,
    },
    Moved {
        node: NodeId,
        transform: Transform,
    },
    MobilityChanged {
        node: NodeId,
        movable: bool,
    },
    PartDestroyed {
        node: NodeId,
    },
    EntityDestroyed {
        entity: EntityId,
    },
}

/// Scene held entirely in memory.
///
/// Nodes store world transforms; the parent links describe structure only.
/// Every mutation is appended to a change log (see [`MemoryScene::take_changes`])
/// so an authoritative copy can be mirrored to remote replicas.
pub struct MemoryScene {
    entities: HashMap<EntityId, SceneEntity>,
    nodes: HashMap<NodeId, SceneNode>,
    focus_handlers: HashMap<FocusTarget, Box<dyn Focusable>>,
    changes: Vec<SceneChange>,
    record_changes: bool,
    /// Network readiness of freshly spawned nodes.
    clones_network_ready: bool,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self {
            entities: HashMap::new(),
            nodes: HashMap::new(),
            focus_handlers: HashMap::new(),
            changes: Vec::new(),
            record_changes: true,
            clones_network_ready: true,
        }
    }
}

impl MemoryScene {
    /// Create a new empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a scene from a snapshot.
    pub fn from_snapshot(snapshot: SceneSnapshot) -> Self {
        let mut scene = Self::new();
        for node in snapshot.nodes {
            scene.nodes.insert(node.id, node);
        }
        for entity in snapshot.entities {
            scene.entities.insert(entity.id, entity);
        }
        scene
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            entities: self.entities.values().cloned().collect(),
            nodes: self.nodes.values().cloned().collect(),
        }
    }

    /// Add a replicated, movable entity with a single root part.
    pub fn spawn_entity(&mut self, name: &str, transform: Transform) -> (EntityId, NodeId) {
        let entity = EntityId::new();
        let root = NodeId::new();
        let node = new_node(root, entity, None, name, transform);
        let record = SceneEntity {
            id: entity,
            name: name.to_string(),
            root,
            parts: vec![root],
            replicated: true,
        };
        self.nodes.insert(root, node.clone());
        self.entities.insert(entity, record.clone());
        self.record(SceneChange::EntitySpawned {
            entity: record,
            nodes: vec![node],
        });
        (entity, root)
    }

    /// Add a part under `parent` within `entity`.
    pub fn add_part(
        &mut self,
        entity: EntityId,
        parent: NodeId,
        name: &str,
        transform: Transform,
    ) -> Option<NodeId> {
        if self.nodes.get(&parent)?.entity != entity {
            return None;
        }
        let id = NodeId::new();
        let node = new_node(id, entity, Some(parent), name, transform);
        self.entities.get_mut(&entity)?.parts.push(id);
        self.nodes.insert(id, node.clone());
        self.record(SceneChange::PartSpawned { node });
        Some(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&SceneEntity> {
        self.entities.get(&id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_entity_replicated(&mut self, entity: EntityId, replicated: bool) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.replicated = replicated;
        }
    }

    pub fn set_part_replicated(&mut self, node: NodeId, replicated: bool) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.replicated = replicated;
        }
    }

    pub fn set_radius(&mut self, node: NodeId, radius: f32) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.radius = radius;
        }
    }

    pub fn set_layers(&mut self, node: NodeId, layers: LayerMask) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.layers = layers;
        }
    }

    pub fn mark_network_ready(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.network_ready = true;
        }
    }

    /// Whether spawned copies are immediately known to remote participants.
    pub fn set_clones_network_ready(&mut self, ready: bool) {
        self.clones_network_ready = ready;
    }

    pub fn register_focusable(&mut self, target: FocusTarget, handler: Box<dyn Focusable>) {
        self.focus_handlers.insert(target, handler);
    }

    /// Drain the change log.
    pub fn take_changes(&mut self) -> Vec<SceneChange> {
        std::mem::take(&mut self.changes)
    }

    /// Apply a change recorded by another scene, without re-recording it.
    pub fn apply_change(&mut self, change: SceneChange) {
        let record = std::mem::replace(&mut self.record_changes, false);
        match change {
            SceneChange::EntitySpawned { entity, nodes } => {
                for node in nodes {
                    self.nodes.insert(node.id, node);
                }
                self.entities.insert(entity.id, entity);
            }
            SceneChange::PartSpawned { node } => {
                if let Some(entity) = self.entities.get_mut(&node.entity) {
                    if !entity.parts.contains(&node.id) {
                        entity.parts.push(node.id);
                    }
                    self.nodes.insert(node.id, node);
                } else {
                    log::warn!("Dropping part {} for unknown entity {}", node.id, node.entity);
                }
            }
            SceneChange::Attached { child, parent } => {
                self.attach(child, parent);
            }
            SceneChange::Moved { node, transform } => {
                self.set_world_transform(node, transform);
            }
            SceneChange::MobilityChanged { node, movable } => {
                self.set_movable(node, movable);
            }
            SceneChange::PartDestroyed { node } => self.destroy_part(node),
            SceneChange::EntityDestroyed { entity } => self.destroy_entity(entity),
        }
        self.record_changes = record;
    }

    fn record(&mut self, change: SceneChange) {
        if self.record_changes {
            self.changes.push(change);
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        while let Some(parent) = self.nodes.get(&node).and_then(|n| n.parent) {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }
}

fn new_node(
    id: NodeId,
    entity: EntityId,
    parent: Option<NodeId>,
    name: &str,
    transform: Transform,
) -> SceneNode {
    SceneNode {
        id,
        entity,
        parent,
        name: name.to_string(),
        transform,
        movable: true,
        replicated: true,
        network_ready: true,
        layers: LayerMask::default(),
        radius: DEFAULT_RADIUS,
    }
}

impl Scene for MemoryScene {
    fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    fn root_of(&self, entity: EntityId) -> Option<NodeId> {
        self.entities.get(&entity).map(|e| e.root)
    }

    fn part_count(&self, entity: EntityId) -> usize {
        self.entities.get(&entity).map_or(0, |e| e.parts.len())
    }

    fn set_world_transform(&mut self, id: NodeId, transform: Transform) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.transform = transform;
        self.record(SceneChange::Moved {
            node: id,
            transform,
        });
        true
    }

    fn set_movable(&mut self, id: NodeId, movable: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if node.movable != movable {
                node.movable = movable;
                self.record(SceneChange::MobilityChanged { node: id, movable });
            }
        }
    }

    fn is_replicated(&self, id: NodeId, granularity: Granularity) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        let entity_replicated = self
            .entities
            .get(&node.entity)
            .is_some_and(|e| e.replicated);
        match granularity {
            Granularity::Entity => entity_replicated,
            Granularity::Part => entity_replicated && node.replicated,
        }
    }

    fn is_network_ready(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.network_ready)
    }

    fn ray_cast(&self, start: Vec3, end: Vec3, filter: &TraceFilter) -> Vec<Hit> {
        let segment = end - start;
        let length = segment.length();
        if length <= f32::EPSILON {
            return Vec::new();
        }
        let dir = segment / length;

        let mut hits: Vec<Hit> = self
            .nodes
            .values()
            .filter(|n| filter.layers.intersects(n.layers))
            .filter(|n| !filter.ignored_entities.contains(&n.entity))
            .filter_map(|n| {
                let t = ray_sphere(start, dir, n.transform.translation, n.radius)?;
                (t <= length).then(|| Hit {
                    target: HitTarget::Node {
                        entity: n.entity,
                        node: n.id,
                    },
                    point: start + dir * t,
                    distance: t,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn spawn_from_template(&mut self, template: EntityId) -> Option<EntityId> {
        let source = self.entities.get(&template)?.clone();
        let id = EntityId::new();
        let mapping: HashMap<NodeId, NodeId> =
            source.parts.iter().map(|p| (*p, NodeId::new())).collect();

        let mut nodes = Vec::with_capacity(source.parts.len());
        for part in &source.parts {
            let Some(original) = self.nodes.get(part) else {
                continue;
            };
            let mut node = original.clone();
            node.id = mapping[part];
            node.entity = id;
            node.parent = original.parent.and_then(|p| mapping.get(&p).copied());
            node.network_ready = self.clones_network_ready;
            nodes.push(node);
        }

        let entity = SceneEntity {
            id,
            name: source.name.clone(),
            root: mapping[&source.root],
            parts: source.parts.iter().map(|p| mapping[p]).collect(),
            replicated: source.replicated,
        };
        for node in &nodes {
            self.nodes.insert(node.id, node.clone());
        }
        self.entities.insert(id, entity.clone());
        self.record(SceneChange::EntitySpawned { entity, nodes });
        Some(id)
    }

    fn duplicate_part(&mut self, part: NodeId) -> Option<NodeId> {
        let mut node = self.nodes.get(&part)?.clone();
        node.id = NodeId::new();
        node.parent = None;
        node.network_ready = self.clones_network_ready;
        self.entities.get_mut(&node.entity)?.parts.push(node.id);
        let id = node.id;
        self.nodes.insert(id, node.clone());
        self.record(SceneChange::PartSpawned { node });
        Some(id)
    }

    fn attach(&mut self, child: NodeId, parent: NodeId) -> bool {
        if child == parent || !self.nodes.contains_key(&parent) || self.is_ancestor(child, parent) {
            return false;
        }
        let Some(node) = self.nodes.get_mut(&child) else {
            return false;
        };
        node.parent = Some(parent);
        self.record(SceneChange::Attached { child, parent });
        true
    }

    fn destroy_part(&mut self, id: NodeId) {
        let Some(removed) = self.nodes.remove(&id) else {
            return;
        };
        for node in self.nodes.values_mut() {
            if node.parent == Some(id) {
                node.parent = removed.parent;
            }
        }
        self.focus_handlers.remove(&FocusTarget::Part(id));

        let mut emptied = false;
        if let Some(entity) = self.entities.get_mut(&removed.entity) {
            entity.parts.retain(|p| *p != id);
            match entity.parts.first() {
                Some(first) if entity.root == id => entity.root = *first,
                Some(_) => {}
                None => emptied = true,
            }
        }
        if emptied {
            self.entities.remove(&removed.entity);
            self.focus_handlers.remove(&FocusTarget::Entity(removed.entity));
        }
        self.record(SceneChange::PartDestroyed { node: id });
    }

    fn destroy_entity(&mut self, entity: EntityId) {
        let Some(removed) = self.entities.remove(&entity) else {
            return;
        };
        for part in &removed.parts {
            self.nodes.remove(part);
            self.focus_handlers.remove(&FocusTarget::Part(*part));
        }
        self.focus_handlers.remove(&FocusTarget::Entity(entity));
        self.record(SceneChange::EntityDestroyed { entity });
    }

    fn focusable(&mut self, target: FocusTarget) -> Option<&mut (dyn Focusable + 'static)> {
        self.focus_handlers.get_mut(&target).map(|h| h.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SessionId;

    fn at(x: f32, y: f32, z: f32) -> Transform {
        Transform::from_translation(Vec3::new(x, y, z))
    }

    struct Recorder;

    impl Focusable for Recorder {
        fn focus(&mut self, _: SessionId, _: NodeId, _: Granularity) {}
        fn unfocus(&mut self, _: SessionId, _: NodeId, _: Granularity) {}
        fn on_new_transform(
            &mut self,
            _: SessionId,
            _: NodeId,
            _: &Transform,
            _: Granularity,
        ) -> Option<Transform> {
            None
        }
    }

    #[test]
    fn test_spawn_entity() {
        let mut scene = MemoryScene::new();
        let (entity, root) = scene.spawn_entity("crate", at(1.0, 0.0, 0.0));
        assert_eq!(scene.root_of(entity), Some(root));
        assert_eq!(scene.owner(root), Some(entity));
        assert_eq!(scene.part_count(entity), 1);
        assert!(scene.is_replicated(root, Granularity::Entity));
        assert_eq!(scene.take_changes().len(), 1);
        assert!(scene.take_changes().is_empty());
    }

    #[test]
    fn test_ray_cast_sorted_and_filtered() {
        let mut scene = MemoryScene::new();
        let (_, far) = scene.spawn_entity("far", at(0.0, 0.0, -10.0));
        let (near_entity, near) = scene.spawn_entity("near", at(0.0, 0.0, -5.0));
        let (_, off) = scene.spawn_entity("off", at(5.0, 0.0, -5.0));

        let hits = scene.ray_cast(Vec3::ZERO, Vec3::new(0.0, 0.0, -100.0), &TraceFilter::default());
        let nodes: Vec<NodeId> = hits
            .iter()
            .filter_map(|h| match h.target {
                HitTarget::Node { node, .. } => Some(node),
                _ => None,
            })
            .collect();
        assert_eq!(nodes, vec![near, far]);
        assert!(!nodes.contains(&off));
        assert!((hits[0].distance - 4.5).abs() < 1.0e-4);

        let filter = TraceFilter {
            ignored_entities: vec![near_entity],
            ..TraceFilter::default()
        };
        let hits = scene.ray_cast(Vec3::ZERO, Vec3::new(0.0, 0.0, -100.0), &filter);
        assert_eq!(hits.len(), 1);

        // segment too short to reach anything
        let hits = scene.ray_cast(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0), &TraceFilter::default());
        assert!(hits.is_empty());
    }

    #[test]
    fn test_layer_filter() {
        let mut scene = MemoryScene::new();
        let (_, root) = scene.spawn_entity("a", at(0.0, 0.0, -5.0));
        scene.set_layers(root, LayerMask(0b10));
        let filter = TraceFilter::with_layers(LayerMask(0b01));
        assert!(scene.ray_cast(Vec3::ZERO, Vec3::NEG_Z * 10.0, &filter).is_empty());
        let filter = TraceFilter::with_layers(LayerMask(0b11));
        assert_eq!(scene.ray_cast(Vec3::ZERO, Vec3::NEG_Z * 10.0, &filter).len(), 1);
    }

    #[test]
    fn test_spawn_from_template_copies_hierarchy() {
        let mut scene = MemoryScene::new();
        let (entity, root) = scene.spawn_entity("robot", Transform::IDENTITY);
        let arm = scene.add_part(entity, root, "arm", at(1.0, 0.0, 0.0)).unwrap();
        scene.add_part(entity, arm, "hand", at(2.0, 0.0, 0.0)).unwrap();
        scene.set_clones_network_ready(false);

        let copy = scene.spawn_from_template(entity).unwrap();
        assert_ne!(copy, entity);
        assert_eq!(scene.part_count(copy), 3);
        let copy_root = scene.root_of(copy).unwrap();
        assert_ne!(copy_root, root);
        assert!(!scene.is_network_ready(copy_root));

        let parts = scene.entity(copy).unwrap().parts.clone();
        let copy_hand = scene.node(parts[2]).unwrap();
        assert_eq!(copy_hand.parent, Some(parts[1]));
        assert_eq!(scene.parent(parts[1]), Some(copy_root));
    }

    #[test]
    fn test_duplicate_and_attach() {
        let mut scene = MemoryScene::new();
        let (entity, root) = scene.spawn_entity("robot", Transform::IDENTITY);
        let arm = scene.add_part(entity, root, "arm", at(1.0, 0.0, 0.0)).unwrap();

        let copy = scene.duplicate_part(arm).unwrap();
        assert_eq!(scene.parent(copy), None);
        assert_eq!(scene.owner(copy), Some(entity));
        assert_eq!(scene.world_transform(copy), scene.world_transform(arm));

        assert!(scene.attach(copy, root));
        assert_eq!(scene.parent(copy), Some(root));
        // no cycles
        assert!(!scene.attach(root, copy));
        assert!(!scene.attach(copy, copy));
    }

    #[test]
    fn test_destroy_part_reparents_children() {
        let mut scene = MemoryScene::new();
        let (entity, root) = scene.spawn_entity("robot", Transform::IDENTITY);
        let arm = scene.add_part(entity, root, "arm", Transform::IDENTITY).unwrap();
        let hand = scene.add_part(entity, arm, "hand", Transform::IDENTITY).unwrap();

        scene.destroy_part(arm);
        assert!(!scene.contains(arm));
        assert_eq!(scene.parent(hand), Some(root));
        assert_eq!(scene.part_count(entity), 2);

        scene.destroy_part(root);
        assert_eq!(scene.root_of(entity), Some(hand));
        scene.destroy_part(hand);
        assert!(!scene.contains_entity(entity));
    }

    #[test]
    fn test_destroy_entity_drops_handlers() {
        let mut scene = MemoryScene::new();
        let (entity, root) = scene.spawn_entity("lamp", Transform::IDENTITY);
        scene.register_focusable(FocusTarget::Entity(entity), Box::new(Recorder));
        assert!(scene.focusable(FocusTarget::Entity(entity)).is_some());

        scene.destroy_entity(entity);
        assert!(!scene.contains(root));
        assert!(scene.focusable(FocusTarget::Entity(entity)).is_none());
    }

    #[test]
    fn test_replica_follows_changes() {
        let mut authority = MemoryScene::new();
        let (entity, root) = authority.spawn_entity("box", Transform::IDENTITY);
        let mut replica = MemoryScene::from_snapshot(authority.snapshot());
        authority.take_changes();

        authority.set_world_transform(root, at(3.0, 0.0, 0.0));
        let copy = authority.spawn_from_template(entity).unwrap();
        for change in authority.take_changes() {
            replica.apply_change(change);
        }
        assert_eq!(replica.world_transform(root), Some(at(3.0, 0.0, 0.0)));
        assert!(replica.contains_entity(copy));
        assert!(replica.take_changes().is_empty());

        authority.destroy_entity(copy);
        for change in authority.take_changes() {
            replica.apply_change(change);
        }
        assert!(!replica.contains_entity(copy));
    }

    #[test]
    fn test_part_replication_flags() {
        let mut scene = MemoryScene::new();
        let (entity, root) = scene.spawn_entity("box", Transform::IDENTITY);
        let lid = scene.add_part(entity, root, "lid", Transform::IDENTITY).unwrap();
        scene.set_part_replicated(lid, false);
        assert!(scene.is_replicated(lid, Granularity::Entity));
        assert!(!scene.is_replicated(lid, Granularity::Part));

        scene.set_entity_replicated(entity, false);
        assert!(!scene.is_replicated(root, Granularity::Entity));
        assert!(!scene.is_replicated(root, Granularity::Part));
    }
}
