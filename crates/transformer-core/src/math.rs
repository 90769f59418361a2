//! Transform value type and the ray/plane geometry used by the gizmos.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Below this, a ray is considered parallel to a plane.
const PARALLEL_EPSILON: f32 = 1.0e-4;

/// Tolerance (in increments) used when quantizing accumulated motion, so that
/// chunks summing to a whole increment are not lost to float error.
pub const SNAP_EPSILON: f32 = 1.0e-4;

/// A rotation, translation and scale triple.
///
/// Used both for absolute world transforms of scene nodes and for delta
/// transforms produced by the gizmos. A delta has its own identity: identity
/// rotation, zero translation and *zero* scale, since scale deltas are summed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity world transform (unit scale).
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Identity delta: nothing rotates, moves or grows.
    pub const ZERO_DELTA: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ZERO,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn with_translation(mut self, translation: Vec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Reset to the delta identity.
    pub fn reset_delta(&mut self) {
        *self = Self::ZERO_DELTA;
    }

    /// Fold another delta into this one: rotation composed (newest first),
    /// translation and scale summed.
    pub fn accumulate(&self, delta: &Transform) -> Transform {
        Transform {
            translation: self.translation + delta.translation,
            rotation: (delta.rotation * self.rotation).normalize(),
            scale: self.scale + delta.scale,
        }
    }

    /// Whether this is (approximately) the delta identity.
    pub fn is_zero_delta(&self, epsilon: f32) -> bool {
        self.translation.abs_diff_eq(Vec3::ZERO, epsilon)
            && self.scale.abs_diff_eq(Vec3::ZERO, epsilon)
            && quat_approx_identity(self.rotation, epsilon)
    }

    /// All components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.translation.is_finite() && self.rotation.is_finite() && self.scale.is_finite()
    }
}

fn quat_approx_identity(q: Quat, epsilon: f32) -> bool {
    // q and -q are the same rotation
    q.abs_diff_eq(Quat::IDENTITY, epsilon) || q.abs_diff_eq(-Quat::IDENTITY, epsilon)
}

/// Intersect a ray with a plane. Returns `None` when the ray is parallel to
/// the plane or the plane lies behind the ray origin.
pub fn intersect_ray_with_plane(
    ray_origin: Vec3,
    ray_dir: Vec3,
    plane_point: Vec3,
    plane_normal: Vec3,
) -> Option<Vec3> {
    let denom = ray_dir.dot(plane_normal);
    if denom.abs() <= PARALLEL_EPSILON {
        return None;
    }
    let t = (plane_point - ray_origin).dot(plane_normal) / denom;
    if t < 0.0 {
        return None;
    }
    Some(ray_origin + ray_dir * t)
}

/// Distance along a normalized ray to the first point inside a sphere.
/// An origin inside the sphere yields zero.
pub fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let oc = origin - center;
    let b = oc.dot(dir);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sqrt = disc.sqrt();
    if -b + sqrt < 0.0 {
        return None;
    }
    Some((-b - sqrt).max(0.0))
}

/// Of the two planes that contain `axis`, pick the normal of the one that
/// faces the viewer the most. Dragging along an axis is projected onto this
/// plane so the motion stays stable at grazing angles.
pub fn plane_normal_containing_axis(axis: Vec3, others: [Vec3; 2], view_forward: Vec3) -> Vec3 {
    let [a, b] = others;
    // a plane containing `axis` and `a` has normal `b`, and vice versa
    if view_forward.dot(b).abs() >= view_forward.dot(a).abs() {
        b
    } else {
        debug_assert!(axis.dot(a).abs() < 1.0e-3);
        a
    }
}

/// Signed angle (radians) of the rotation `q` around `axis` (swing-twist
/// decomposition, twist part). `axis` must be normalized.
pub fn twist_angle(q: Quat, axis: Vec3) -> f32 {
    let projection = Vec3::new(q.x, q.y, q.z).dot(axis);
    let angle = 2.0 * projection.atan2(q.w);
    wrap_angle(angle)
}

/// Signed angle from `from` to `to` around `axis`.
pub fn signed_angle_around(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    let cross = from.cross(to);
    cross.dot(axis).atan2(from.dot(to))
}

/// Wrap an angle to (-PI, PI].
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Whole increments contained in `value`, truncated toward zero.
pub fn snap_steps(value: f32, increment: f32) -> f32 {
    let ratio = value / increment;
    (ratio + ratio.signum() * SNAP_EPSILON).trunc()
}

/// Truncate each component to a whole number of increments.
pub fn snap_vector_toward_zero(value: Vec3, increment: f32) -> Vec3 {
    Vec3::new(
        snap_steps(value.x, increment),
        snap_steps(value.y, increment),
        snap_steps(value.z, increment),
    ) * increment
}

/// Round each component to the nearest whole number of increments.
pub fn snap_vector_nearest(value: Vec3, increment: f32) -> Vec3 {
    (value / increment).round() * increment
}
