//! Transformer Core Library
//!
//! Gizmo-driven transform resolution, selection management and
//! client/server replication of manipulation sessions.

pub mod clone;
pub mod config;
pub mod domain;
pub mod engine;
pub mod gizmo;
pub mod link;
pub mod math;
pub mod replication;
pub mod scene;
pub mod selection;
pub mod session;
pub mod sync;

pub use config::{ConfigError, ReplicationConfig, SessionConfig, SnappingConfig, TransformerConfig};
pub use domain::{GizmoPlacement, Granularity, SpaceType, TransformationDomain, TransformationKind};
pub use engine::FrameInput;
pub use gizmo::{Gizmo, GizmoVariant};
pub use link::RemoteLink;
pub use math::Transform;
pub use replication::{Broadcast, ReplicatedSession, Request, Role};
pub use scene::{EntityId, GizmoId, MemoryScene, NodeId, Scene, SessionId, TraceFilter};
pub use selection::{SelectionPolicy, SelectionSet};
pub use session::{DesyncReason, ManipulationSession, SessionEvent};
pub use sync::{ClientMessage, ConnectionState, ServerMessage, SyncEvent};
#[cfg(not(target_arch = "wasm32"))]
pub use sync::NativeWebSocket;
