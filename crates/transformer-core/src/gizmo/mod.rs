//! Gizmos: interactive handles that turn pointer rays into delta transforms.
//!
//! Every gizmo kind implements [`GizmoContract`]. [`Gizmo`] owns the state the
//! kinds share (where it sits, what it is attached to, whether a drag is in
//! progress) and dispatches to the kind-specific behavior.

mod rotation;
mod scale;
pub mod snap;
mod translation;

pub use rotation::RotationGizmo;
pub use scale::ScaleGizmo;
pub use translation::TranslationGizmo;

use crate::domain::{SpaceType, TransformationDomain, TransformationKind};
use crate::math::{Transform, intersect_ray_with_plane, plane_normal_containing_axis, ray_sphere};
use crate::scene::{GizmoId, Hit, HitTarget, NodeId};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Handle distance from the gizmo center, in view-scaled units.
const AXIS_HANDLE_OFFSET: f32 = 1.0;
const PLANE_HANDLE_OFFSET: f32 = 0.35;
const HANDLE_RADIUS: f32 = 0.12;
const CENTER_RADIUS: f32 = 0.15;
const RING_RADIUS: f32 = 1.0;
const RING_TOLERANCE: f32 = 0.08;
/// Share of the vertical field of view the gizmo should cover.
const SCREEN_FRACTION: f32 = 0.15;
const MIN_VIEW_SCALE: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn local(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }

    pub fn domain(self) -> TransformationDomain {
        match self {
            Axis::X => TransformationDomain::XAxis,
            Axis::Y => TransformationDomain::YAxis,
            Axis::Z => TransformationDomain::ZAxis,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plane {
    XY,
    YZ,
    XZ,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::XY, Plane::YZ, Plane::XZ];

    /// The two local axes spanning the plane.
    pub fn axes(self) -> [Vec3; 2] {
        match self {
            Plane::XY => [Vec3::X, Vec3::Y],
            Plane::YZ => [Vec3::Y, Vec3::Z],
            Plane::XZ => [Vec3::X, Vec3::Z],
        }
    }

    pub fn domain(self) -> TransformationDomain {
        match self {
            Plane::XY => TransformationDomain::XYPlane,
            Plane::YZ => TransformationDomain::YZPlane,
            Plane::XZ => TransformationDomain::XZPlane,
        }
    }
}

/// A pickable piece of a gizmo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GizmoPart {
    Axis(Axis),
    Plane(Plane),
    Ring(Axis),
    Center,
}

/// Where a gizmo sits and how its axes are oriented.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GizmoAnchor {
    pub location: Vec3,
    /// World rotation of the gizmo axes (identity in world space).
    pub rotation: Quat,
    /// World units per gizmo unit, from the distance to the viewer.
    pub view_scale: f32,
}

impl Default for GizmoAnchor {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            view_scale: 1.0,
        }
    }
}

impl GizmoAnchor {
    /// World direction of a local axis.
    pub fn world_axis(&self, local: Vec3) -> Vec3 {
        (self.rotation * local).normalize()
    }

    /// Express a world vector in gizmo axes.
    pub fn to_local(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * world
    }

    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.rotation * local
    }

    /// Keep only the components of `offset` that `domain` may move along.
    pub fn constrain(&self, offset: Vec3, domain: TransformationDomain) -> Vec3 {
        self.to_world(self.to_local(offset) * domain.mask())
    }

    /// Normal of the plane a pointer ray is projected onto while dragging
    /// in `domain`.
    pub fn drag_plane_normal(&self, domain: TransformationDomain, view_forward: Vec3) -> Option<Vec3> {
        if let Some(local_axis) = domain.axis() {
            let others = match domain {
                TransformationDomain::XAxis => [Vec3::Y, Vec3::Z],
                TransformationDomain::YAxis => [Vec3::X, Vec3::Z],
                _ => [Vec3::X, Vec3::Y],
            };
            return Some(plane_normal_containing_axis(
                self.world_axis(local_axis),
                others.map(|o| self.world_axis(o)),
                view_forward,
            ));
        }
        if let Some(normal) = domain.plane_normal() {
            return Some(self.world_axis(normal));
        }
        match domain {
            TransformationDomain::Uniform => Some(-view_forward.normalize_or_zero()),
            _ => None,
        }
    }

    /// Where the ray `origin..end` meets the drag plane through the gizmo.
    pub fn drag_point(
        &self,
        domain: TransformationDomain,
        view_forward: Vec3,
        ray_origin: Vec3,
        ray_end: Vec3,
    ) -> Option<Vec3> {
        let normal = self.drag_plane_normal(domain, view_forward)?;
        let dir = (ray_end - ray_origin).normalize_or_zero();
        intersect_ray_with_plane(ray_origin, dir, self.location, normal)
    }
}

/// Remembers the previous drag point so consecutive rays yield offsets.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DragTracker {
    previous: Option<Vec3>,
}

impl DragTracker {
    /// Offset from the previous point. The first point after a reset only
    /// primes the tracker.
    pub(crate) fn advance(&mut self, point: Vec3) -> Option<Vec3> {
        self.previous.replace(point).map(|prev| point - prev)
    }

    pub(crate) fn previous(&self) -> Option<Vec3> {
        self.previous
    }

    pub(crate) fn reset(&mut self) {
        self.previous = None;
    }
}

/// Behavior each gizmo kind provides.
pub trait GizmoContract {
    fn kind(&self) -> TransformationKind;

    /// Pickable parts, in picking priority order.
    fn handles(&self) -> &'static [GizmoPart];

    /// Domain a part maps to. Parts the kind does not own map to `None`.
    fn detect_domain(&self, part: GizmoPart) -> TransformationDomain;

    /// Delta for the pointer moving to the ray `origin..end` since the
    /// previous call.
    fn compute_delta(
        &mut self,
        anchor: &GizmoAnchor,
        view_forward: Vec3,
        ray_origin: Vec3,
        ray_end: Vec3,
        domain: TransformationDomain,
    ) -> Transform;

    /// Quantize `raw` to whole increments, carrying the remainder in
    /// `accumulated`.
    fn snap(
        &self,
        anchor: &GizmoAnchor,
        accumulated: &mut Transform,
        raw: &Transform,
        domain: TransformationDomain,
        increment: f32,
    ) -> Transform;

    /// Round the step from `current` to `candidate` for one target.
    fn snap_target(
        &self,
        anchor: &GizmoAnchor,
        current: &Transform,
        candidate: &Transform,
        domain: TransformationDomain,
        increment: f32,
    ) -> Transform;

    /// Forget the previous drag point.
    fn reset_drag(&mut self);

    fn forces_local_space(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub enum GizmoVariant {
    Translation(TranslationGizmo),
    Rotation(RotationGizmo),
    Scale(ScaleGizmo),
}

/// A spawned gizmo.
#[derive(Debug, Clone)]
pub struct Gizmo {
    id: GizmoId,
    anchor: GizmoAnchor,
    space: SpaceType,
    attached_to: Option<NodeId>,
    in_progress: bool,
    domain: TransformationDomain,
    variant: GizmoVariant,
}

impl Gizmo {
    /// Spawn the gizmo for `kind`. `NoTransform` has none.
    pub fn for_kind(kind: TransformationKind) -> Option<Self> {
        let variant = match kind {
            TransformationKind::Translation => GizmoVariant::Translation(TranslationGizmo::default()),
            TransformationKind::Rotation => GizmoVariant::Rotation(RotationGizmo::default()),
            TransformationKind::Scale => GizmoVariant::Scale(ScaleGizmo::default()),
            TransformationKind::NoTransform => return None,
        };
        Some(Self {
            id: GizmoId::new(),
            anchor: GizmoAnchor::default(),
            space: SpaceType::World,
            attached_to: None,
            in_progress: false,
            domain: TransformationDomain::None,
            variant,
        })
    }

    fn contract(&self) -> &dyn GizmoContract {
        match &self.variant {
            GizmoVariant::Translation(g) => g,
            GizmoVariant::Rotation(g) => g,
            GizmoVariant::Scale(g) => g,
        }
    }

    fn contract_mut(&mut self) -> &mut dyn GizmoContract {
        match &mut self.variant {
            GizmoVariant::Translation(g) => g,
            GizmoVariant::Rotation(g) => g,
            GizmoVariant::Scale(g) => g,
        }
    }

    pub fn id(&self) -> GizmoId {
        self.id
    }

    pub fn kind(&self) -> TransformationKind {
        self.contract().kind()
    }

    pub fn anchor(&self) -> &GizmoAnchor {
        &self.anchor
    }

    pub fn location(&self) -> Vec3 {
        self.anchor.location
    }

    pub fn space(&self) -> SpaceType {
        self.space
    }

    pub fn attached_to(&self) -> Option<NodeId> {
        self.attached_to
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn domain(&self) -> TransformationDomain {
        self.domain
    }

    pub fn detect_domain(&self, part: GizmoPart) -> TransformationDomain {
        self.contract().detect_domain(part)
    }

    pub fn compute_delta(
        &mut self,
        view_forward: Vec3,
        ray_origin: Vec3,
        ray_end: Vec3,
        domain: TransformationDomain,
    ) -> Transform {
        let anchor = self.anchor;
        self.contract_mut()
            .compute_delta(&anchor, view_forward, ray_origin, ray_end, domain)
    }

    pub fn snap(
        &self,
        accumulated: &mut Transform,
        raw: &Transform,
        domain: TransformationDomain,
        increment: f32,
    ) -> Transform {
        self.contract()
            .snap(&self.anchor, accumulated, raw, domain, increment)
    }

    pub fn snap_target(
        &self,
        current: &Transform,
        candidate: &Transform,
        domain: TransformationDomain,
        increment: f32,
    ) -> Transform {
        self.contract()
            .snap_target(&self.anchor, current, candidate, domain, increment)
    }

    /// Start or stop a drag. Returns whether anything changed.
    pub fn set_progress_state(&mut self, in_progress: bool, domain: TransformationDomain) -> bool {
        let changed = self.in_progress != in_progress || self.domain != domain;
        self.in_progress = in_progress;
        self.domain = domain;
        if changed {
            self.contract_mut().reset_drag();
        }
        changed
    }

    /// Attach to a node, moving onto it.
    pub fn attach_to(&mut self, node: NodeId, world: &Transform) {
        self.attached_to = Some(node);
        self.anchor.location = world.translation;
    }

    /// Follow the attached node after it moved.
    pub fn follow(&mut self, world: &Transform) {
        self.anchor.location = world.translation;
        self.update_space(self.space, world.rotation);
    }

    /// Orient the gizmo axes for `space`. Kinds that only work in local
    /// space ignore a world request.
    pub fn update_space(&mut self, space: SpaceType, target_rotation: Quat) {
        self.space = if self.contract().forces_local_space() {
            SpaceType::Local
        } else {
            space
        };
        self.anchor.rotation = match self.space {
            SpaceType::World => Quat::IDENTITY,
            SpaceType::Local => target_rotation.normalize(),
        };
    }

    /// Resize so the gizmo covers a constant share of the view.
    pub fn scale_for_view(&mut self, camera_location: Vec3, camera_forward: Vec3, fov_degrees: f32) {
        let forward = camera_forward.normalize_or_zero();
        let depth = (self.anchor.location - camera_location).dot(forward);
        if depth <= 0.0 {
            return;
        }
        let half_fov = (fov_degrees.to_radians() * 0.5).tan();
        self.anchor.view_scale = (depth * half_fov * SCREEN_FRACTION).max(MIN_VIEW_SCALE);
    }

    /// Nearest gizmo part along the ray `start..end`, if any.
    pub fn pick(&self, start: Vec3, end: Vec3) -> Option<Hit> {
        let segment = end - start;
        let length = segment.length();
        if length <= f32::EPSILON {
            return None;
        }
        let dir = segment / length;
        let s = self.anchor.view_scale;
        let anchor = &self.anchor;

        self.contract()
            .handles()
            .iter()
            .filter_map(|part| {
                let distance = match *part {
                    GizmoPart::Axis(axis) => ray_sphere(
                        start,
                        dir,
                        anchor.location + anchor.world_axis(axis.local()) * AXIS_HANDLE_OFFSET * s,
                        HANDLE_RADIUS * s,
                    ),
                    GizmoPart::Plane(plane) => {
                        let [a, b] = plane.axes();
                        ray_sphere(
                            start,
                            dir,
                            anchor.location + anchor.to_world(a + b) * PLANE_HANDLE_OFFSET * s,
                            HANDLE_RADIUS * s,
                        )
                    }
                    GizmoPart::Center => ray_sphere(start, dir, anchor.location, CENTER_RADIUS * s),
                    GizmoPart::Ring(axis) => {
                        let normal = anchor.world_axis(axis.local());
                        intersect_ray_with_plane(start, dir, anchor.location, normal).and_then(|p| {
                            let radial = (p - anchor.location).length();
                            ((radial - RING_RADIUS * s).abs() <= RING_TOLERANCE * s)
                                .then(|| (p - start).length())
                        })
                    }
                }?;
                (distance <= length).then_some(Hit {
                    target: HitTarget::Gizmo {
                        gizmo: self.id,
                        part: *part,
                    },
                    point: start + dir * distance,
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}
