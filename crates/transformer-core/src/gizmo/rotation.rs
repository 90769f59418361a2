//! Rotation gizmo: one ring per axis.

use super::{Axis, GizmoAnchor, GizmoContract, GizmoPart, snap};
use crate::domain::{TransformationDomain, TransformationKind};
use crate::math::{Transform, intersect_ray_with_plane, signed_angle_around};
use glam::{Quat, Vec3};

const HANDLES: &[GizmoPart] = &[
    GizmoPart::Ring(Axis::X),
    GizmoPart::Ring(Axis::Y),
    GizmoPart::Ring(Axis::Z),
];

/// Pointer positions closer than this to the pivot give no usable angle.
const MIN_ARM_LENGTH_SQ: f32 = 1.0e-8;

#[derive(Debug, Clone, Default)]
pub struct RotationGizmo {
    /// Pivot-to-pointer vector of the previous ray.
    previous_arm: Option<Vec3>,
}

impl RotationGizmo {
    fn world_axis(anchor: &GizmoAnchor, domain: TransformationDomain) -> Option<Vec3> {
        domain.axis().map(|local| anchor.world_axis(local))
    }
}

impl GizmoContract for RotationGizmo {
    fn kind(&self) -> TransformationKind {
        TransformationKind::Rotation
    }

    fn handles(&self) -> &'static [GizmoPart] {
        HANDLES
    }

    fn detect_domain(&self, part: GizmoPart) -> TransformationDomain {
        match part {
            GizmoPart::Ring(axis) => axis.domain(),
            _ => TransformationDomain::None,
        }
    }

    fn compute_delta(
        &mut self,
        anchor: &GizmoAnchor,
        _view_forward: Vec3,
        ray_origin: Vec3,
        ray_end: Vec3,
        domain: TransformationDomain,
    ) -> Transform {
        let mut delta = Transform::ZERO_DELTA;
        let Some(axis) = Self::world_axis(anchor, domain) else {
            return delta;
        };
        let dir = (ray_end - ray_origin).normalize_or_zero();
        // ring seen edge-on: no motion
        let Some(point) = intersect_ray_with_plane(ray_origin, dir, anchor.location, axis) else {
            return delta;
        };
        let arm = point - anchor.location;
        if arm.length_squared() < MIN_ARM_LENGTH_SQ {
            return delta;
        }
        if let Some(previous) = self.previous_arm.replace(arm) {
            let angle = signed_angle_around(previous, arm, axis);
            delta.rotation = Quat::from_axis_angle(axis, angle);
        }
        delta
    }

    fn snap(
        &self,
        anchor: &GizmoAnchor,
        accumulated: &mut Transform,
        raw: &Transform,
        domain: TransformationDomain,
        increment: f32,
    ) -> Transform {
        let Some(axis) = Self::world_axis(anchor, domain) else {
            return *raw;
        };
        let mut applied = *raw;
        applied.rotation =
            snap::carry_rotation(axis, &mut accumulated.rotation, raw.rotation, increment);
        applied
    }

    fn snap_target(
        &self,
        anchor: &GizmoAnchor,
        current: &Transform,
        candidate: &Transform,
        domain: TransformationDomain,
        increment: f32,
    ) -> Transform {
        let Some(axis) = Self::world_axis(anchor, domain) else {
            return *candidate;
        };
        let step = snap::round_rotation(axis, current.rotation, candidate.rotation, increment);
        candidate.with_rotation((step * current.rotation).normalize())
    }

    fn reset_drag(&mut self) {
        self.previous_arm = None;
    }
}
