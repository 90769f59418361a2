//! Scale gizmo: per-axis, per-plane and uniform handles.
//!
//! Scale deltas are produced in the target's own frame (the gizmo is always
//! oriented like its target) and expressed in world space, so that un-rotating
//! them by the target's rotation yields local axis amounts.

use super::{Axis, DragTracker, GizmoAnchor, GizmoContract, GizmoPart, Plane, snap};
use crate::domain::{TransformationDomain, TransformationKind};
use crate::math::Transform;
use glam::Vec3;

const HANDLES: &[GizmoPart] = &[
    GizmoPart::Center,
    GizmoPart::Axis(Axis::X),
    GizmoPart::Axis(Axis::Y),
    GizmoPart::Axis(Axis::Z),
    GizmoPart::Plane(Plane::XY),
    GizmoPart::Plane(Plane::YZ),
    GizmoPart::Plane(Plane::XZ),
];

#[derive(Debug, Clone, Default)]
pub struct ScaleGizmo {
    drag: DragTracker,
}

impl GizmoContract for ScaleGizmo {
    fn kind(&self) -> TransformationKind {
        TransformationKind::Scale
    }

    fn handles(&self) -> &'static [GizmoPart] {
        HANDLES
    }

    fn detect_domain(&self, part: GizmoPart) -> TransformationDomain {
        match part {
            GizmoPart::Axis(axis) => axis.domain(),
            GizmoPart::Plane(plane) => plane.domain(),
            GizmoPart::Center => TransformationDomain::Uniform,
            GizmoPart::Ring(_) => TransformationDomain::None,
        }
    }

    fn compute_delta(
        &mut self,
        anchor: &GizmoAnchor,
        view_forward: Vec3,
        ray_origin: Vec3,
        ray_end: Vec3,
        domain: TransformationDomain,
    ) -> Transform {
        let mut delta = Transform::ZERO_DELTA;
        let Some(point) = anchor.drag_point(domain, view_forward, ray_origin, ray_end) else {
            return delta;
        };
        let previous = self.drag.previous();
        let Some(offset) = self.drag.advance(point) else {
            return delta;
        };
        let units = anchor.view_scale.max(f32::EPSILON);

        let local = if domain == TransformationDomain::Uniform {
            // growth is the change in distance from the gizmo center
            let before = previous.map_or(0.0, |p| (p - anchor.location).length());
            let after = (point - anchor.location).length();
            Vec3::splat((after - before) / units)
        } else {
            anchor.to_local(anchor.constrain(offset, domain)) / units
        };
        delta.scale = anchor.to_world(local);
        delta
    }

    fn snap(
        &self,
        anchor: &GizmoAnchor,
        accumulated: &mut Transform,
        raw: &Transform,
        _domain: TransformationDomain,
        increment: f32,
    ) -> Transform {
        let mut applied = *raw;
        applied.scale = snap::carry_vector(anchor, &mut accumulated.scale, raw.scale, increment);
        applied
    }

    fn snap_target(
        &self,
        _anchor: &GizmoAnchor,
        current: &Transform,
        candidate: &Transform,
        _domain: TransformationDomain,
        increment: f32,
    ) -> Transform {
        // scale lives in the target's local frame already
        let step = candidate.scale - current.scale;
        let rounded = crate::math::snap_vector_nearest(step, increment);
        candidate.with_scale(current.scale + rounded)
    }

    fn reset_drag(&mut self) {
        self.drag.reset();
    }

    fn forces_local_space(&self) -> bool {
        true
    }
}
