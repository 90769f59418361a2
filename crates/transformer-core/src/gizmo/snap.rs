//! Increment snapping for gizmo deltas.
//!
//! Two stages are applied while dragging. The running delta is quantized to
//! whole increments with the sub-increment remainder carried over to the next
//! frame, so slow drags still add up. Each target's resulting step is then
//! rounded so targets land on whole increments relative to where they were.

use super::GizmoAnchor;
use crate::math::{snap_steps, snap_vector_nearest, snap_vector_toward_zero, twist_angle};
use glam::{Quat, Vec3};

/// Quantize `raw` (world) in gizmo axes, carrying the remainder in `carry`.
/// Returns the whole-increment part, in world space.
pub fn carry_vector(anchor: &GizmoAnchor, carry: &mut Vec3, raw: Vec3, increment: f32) -> Vec3 {
    let total = anchor.to_local(*carry + raw);
    let snapped = snap_vector_toward_zero(total, increment);
    *carry = anchor.to_world(total - snapped);
    anchor.to_world(snapped)
}

/// Quantize a rotation about `axis`, carrying the remainder in `carry`.
/// `increment` is in degrees.
pub fn carry_rotation(axis: Vec3, carry: &mut Quat, raw: Quat, increment: f32) -> Quat {
    let step = increment.to_radians();
    let angle = twist_angle(raw * *carry, axis);
    let snapped = snap_steps(angle, step) * step;
    *carry = Quat::from_axis_angle(axis, angle - snapped);
    Quat::from_axis_angle(axis, snapped)
}

/// Round a world step to whole increments in gizmo axes.
pub fn round_in_frame(anchor: &GizmoAnchor, step: Vec3, increment: f32) -> Vec3 {
    anchor.to_world(snap_vector_nearest(anchor.to_local(step), increment))
}

/// Round the rotation taking `current` to `candidate` about `axis` to whole
/// increments (degrees). Returns the rounded rotation step.
pub fn round_rotation(axis: Vec3, current: Quat, candidate: Quat, increment: f32) -> Quat {
    let step = increment.to_radians();
    let angle = twist_angle(candidate * current.inverse(), axis);
    Quat::from_axis_angle(axis, (angle / step).round() * step)
}
