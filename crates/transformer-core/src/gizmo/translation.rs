//! Translation gizmo: axis arrows, plane squares and a free-move center.

use super::{Axis, DragTracker, GizmoAnchor, GizmoContract, GizmoPart, Plane, snap};
use crate::domain::{TransformationDomain, TransformationKind};
use crate::math::Transform;
use glam::Vec3;

const HANDLES: &[GizmoPart] = &[
    GizmoPart::Axis(Axis::X),
    GizmoPart::Axis(Axis::Y),
    GizmoPart::Axis(Axis::Z),
    GizmoPart::Plane(Plane::XY),
    GizmoPart::Plane(Plane::YZ),
    GizmoPart::Plane(Plane::XZ),
    GizmoPart::Center,
];

#[derive(Debug, Clone, Default)]
pub struct TranslationGizmo {
    drag: DragTracker,
}

impl GizmoContract for TranslationGizmo {
    fn kind(&self) -> TransformationKind {
        TransformationKind::Translation
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
        if let Some(offset) = self.drag.advance(point) {
            delta.translation = anchor.constrain(offset, domain);
        }
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
        applied.translation =
            snap::carry_vector(anchor, &mut accumulated.translation, raw.translation, increment);
        applied
    }

    fn snap_target(
        &self,
        anchor: &GizmoAnchor,
        current: &Transform,
        candidate: &Transform,
        _domain: TransformationDomain,
        increment: f32,
    ) -> Transform {
        let step = candidate.translation - current.translation;
        let rounded = snap::round_in_frame(anchor, step, increment);
        candidate.with_translation(current.translation + rounded)
    }

    fn reset_drag(&mut self) {
        self.drag.reset();
    }
}
