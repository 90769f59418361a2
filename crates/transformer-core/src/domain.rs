//! Enumerations describing how a manipulation is interpreted.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// The axis, plane or free-form subset of space a manipulation is constrained to.
///
/// `None` means no manipulation is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationDomain {
    #[default]
    None,
    XAxis,
    YAxis,
    ZAxis,
    #[serde(rename = "xy_plane")]
    XYPlane,
    #[serde(rename = "yz_plane")]
    YZPlane,
    #[serde(rename = "xz_plane")]
    XZPlane,
    /// All three axes at once (free translation, uniform scale).
    Uniform,
}

impl TransformationDomain {
    pub fn is_none(self) -> bool {
        self == TransformationDomain::None
    }

    pub fn is_active(self) -> bool {
        !self.is_none()
    }

    /// Local axis for single-axis domains.
    pub fn axis(self) -> Option<Vec3> {
        match self {
            TransformationDomain::XAxis => Some(Vec3::X),
            TransformationDomain::YAxis => Some(Vec3::Y),
            TransformationDomain::ZAxis => Some(Vec3::Z),
            _ => None,
        }
    }

    /// Local normal for plane domains.
    pub fn plane_normal(self) -> Option<Vec3> {
        match self {
            TransformationDomain::XYPlane => Some(Vec3::Z),
            TransformationDomain::YZPlane => Some(Vec3::X),
            TransformationDomain::XZPlane => Some(Vec3::Y),
            _ => None,
        }
    }

    /// 1.0 on every local axis the domain may move along, 0.0 elsewhere.
    pub fn mask(self) -> Vec3 {
        match self {
            TransformationDomain::None => Vec3::ZERO,
            TransformationDomain::XAxis => Vec3::X,
            TransformationDomain::YAxis => Vec3::Y,
            TransformationDomain::ZAxis => Vec3::Z,
            TransformationDomain::XYPlane => Vec3::new(1.0, 1.0, 0.0),
            TransformationDomain::YZPlane => Vec3::new(0.0, 1.0, 1.0),
            TransformationDomain::XZPlane => Vec3::new(1.0, 0.0, 1.0),
            TransformationDomain::Uniform => Vec3::ONE,
        }
    }
}

/// Which kind of transformation the gizmo produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationKind {
    #[default]
    Translation,
    Rotation,
    Scale,
    /// Selection without any gizmo.
    NoTransform,
}

/// Frame in which the gizmo axes are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceType {
    #[default]
    World,
    Local,
}

/// Which selected member the gizmo attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GizmoPlacement {
    OnFirstSelection,
    #[default]
    OnLastSelection,
}

/// Whether selection operates on whole entities or on their individual parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Entity,
    Part,
}
