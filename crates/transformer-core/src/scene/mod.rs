//! Scene abstraction the manipulation engine operates on.
//!
//! The engine never owns scene data. Everything it needs (hierarchy lookups,
//! world transforms, ray casts, spawning and destruction, replication
//! readiness) goes through the [`Scene`] trait. [`MemoryScene`] is the
//! in-process implementation used by the server and the tests.

mod memory;

pub use memory::{MemoryScene, SceneChange, SceneSnapshot};

use crate::domain::Granularity;
use crate::gizmo::GizmoPart;
use crate::math::Transform;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// A transformable part of an entity.
    NodeId
);
uuid_id!(
    /// A top-level scene object owning a hierarchy of parts.
    EntityId
);
uuid_id!(
    /// One participant's manipulation session.
    SessionId
);
uuid_id!(GizmoId);

/// Bitmask of trace channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: Self = Self(u32::MAX);
    pub const NONE: Self = Self(0);

    pub fn intersects(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self(1)
    }
}

/// Restricts what a ray cast may hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFilter {
    pub layers: LayerMask,
    #[serde(default)]
    pub ignored_entities: Vec<EntityId>,
    #[serde(default)]
    pub ignored_gizmos: Vec<GizmoId>,
}

impl Default for TraceFilter {
    fn default() -> Self {
        Self {
            layers: LayerMask::ALL,
            ignored_entities: Vec::new(),
            ignored_gizmos: Vec::new(),
        }
    }
}

impl TraceFilter {
    pub fn with_layers(layers: LayerMask) -> Self {
        Self {
            layers,
            ..Self::default()
        }
    }
}

/// What a ray hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HitTarget {
    Node { entity: EntityId, node: NodeId },
    Gizmo { gizmo: GizmoId, part: GizmoPart },
}

/// A single ray cast result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub target: HitTarget,
    pub point: Vec3,
    pub distance: f32,
}

/// Identifies the object whose focus hooks apply to a node, which depends on
/// the selection granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusTarget {
    Entity(EntityId),
    Part(NodeId),
}

/// Hooks an object can implement to react to being selected and moved.
pub trait Focusable: Send {
    /// Called when the node is added to a selection.
    fn focus(&mut self, session: SessionId, node: NodeId, granularity: Granularity);

    /// Called when the node is removed from a selection.
    fn unfocus(&mut self, session: SessionId, node: NodeId, granularity: Granularity);

    /// Called before the engine moves the node. Returning a transform makes
    /// the object move itself there.
    fn on_new_transform(
        &mut self,
        session: SessionId,
        node: NodeId,
        transform: &Transform,
        granularity: Granularity,
    ) -> Option<Transform>;
}

/// Everything the engine needs to know about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub id: NodeId,
    pub entity: EntityId,
    pub parent: Option<NodeId>,
    pub name: String,
    /// World transform.
    pub transform: Transform,
    pub movable: bool,
    pub replicated: bool,
    pub network_ready: bool,
    pub layers: LayerMask,
    /// Radius of the bounding sphere used for ray casts.
    pub radius: f32,
}

/// Scene graph, spawning and ray casting services.
pub trait Scene {
    fn node(&self, id: NodeId) -> Option<&SceneNode>;

    fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    fn owner(&self, id: NodeId) -> Option<EntityId> {
        self.node(id).map(|n| n.entity)
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    fn world_transform(&self, id: NodeId) -> Option<Transform> {
        self.node(id).map(|n| n.transform)
    }

    fn contains_entity(&self, entity: EntityId) -> bool {
        self.root_of(entity).is_some()
    }

    /// Root node of an entity.
    fn root_of(&self, entity: EntityId) -> Option<NodeId>;

    /// Number of parts an entity has, root included.
    fn part_count(&self, entity: EntityId) -> usize;

    fn set_world_transform(&mut self, id: NodeId, transform: Transform) -> bool;

    fn set_movable(&mut self, id: NodeId, movable: bool);

    /// Whether changes to this node reach other participants. Entity
    /// granularity checks the owning entity; part granularity also checks
    /// the part itself.
    fn is_replicated(&self, id: NodeId, granularity: Granularity) -> bool;

    /// Whether remote participants know about this node yet.
    fn is_network_ready(&self, id: NodeId) -> bool;

    /// Hits along the segment `start..end`, nearest first.
    fn ray_cast(&self, start: Vec3, end: Vec3, filter: &TraceFilter) -> Vec<Hit>;

    /// Spawn a copy of `template` with all its parts. Returns the new entity.
    fn spawn_from_template(&mut self, template: EntityId) -> Option<EntityId>;

    /// Duplicate a part into its owner, keeping its transform. The copy has
    /// no parent until [`Scene::attach`] is called.
    fn duplicate_part(&mut self, part: NodeId) -> Option<NodeId>;

    /// Parent `child` under `parent`, keeping the child's world transform.
    fn attach(&mut self, child: NodeId, parent: NodeId) -> bool;

    fn destroy_part(&mut self, id: NodeId);

    fn destroy_entity(&mut self, entity: EntityId);

    /// Focus hooks for the target, if it implements them.
    fn focusable(&mut self, target: FocusTarget) -> Option<&mut (dyn Focusable + 'static)>;
}
