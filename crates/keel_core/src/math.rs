//! Transforms and bounding volumes
//!
//! Re-exports glam and adds the scene-graph flavoured types the world works
//! with: a decomposed [`Transform`], axis-aligned boxes, spheres and frusta.

pub use glam::*;

use serde::{Deserialize, Serialize};

/// Position / rotation / non-uniform scale, applied scale first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: Quat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// `self * local`: express `local` (given relative to `self`) in the
    /// space `self` lives in.
    pub fn mul_transform(&self, local: &Transform) -> Transform {
        Transform {
            position: self.transform_point(local.position),
            rotation: (self.rotation * local.rotation).normalize(),
            scale: self.scale * local.scale,
        }
    }

    /// Inverse for transforms with uniform or axis-aligned scale.
    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.conjugate();
        let scale = self.scale.recip();
        Transform {
            position: -(scale * (rotation * self.position)),
            rotation,
            scale,
        }
    }

    /// Local transform that yields `global` when placed under `parent`.
    pub fn relative_to(global: &Transform, parent: &Transform) -> Transform {
        parent.inverse().mul_transform(global)
    }

    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (self.scale * point)
    }

    #[inline]
    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn abs_diff_eq(&self, other: &Transform, max_abs_diff: f32) -> bool {
        self.position.abs_diff_eq(other.position, max_abs_diff)
            && self.scale.abs_diff_eq(other.scale, max_abs_diff)
            && (self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
                || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff))
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        self.mul_transform(&rhs)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Self { min: first, max: first }, |acc, p| Self {
            min: acc.min.min(p),
            max: acc.max.max(p),
        }))
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Touching boxes count as intersecting.
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }

    /// Box enclosing this box after it has been moved by `transform`.
    pub fn transformed(&self, transform: &Transform) -> Aabb {
        let center = transform.transform_point(self.center());
        let extents = self.half_extents() * transform.scale.abs();
        let basis = Mat3::from_quat(transform.rotation);
        let world_extents = Vec3::new(
            basis.row(0).abs().dot(extents),
            basis.row(1).abs().dot(extents),
            basis.row(2).abs().dot(extents),
        );
        Aabb::from_center_half_extents(center, world_extents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius: radius.abs(),
        }
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_center_half_extents(self.center, Vec3::splat(self.radius))
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        aabb.closest_point(self.center).distance_squared(self.center) <= self.radius * self.radius
    }
}

/// Six inward-facing planes, stored as `(normal, distance)` so that
/// `normal.dot(p) + distance >= 0` holds for points inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
    corners: [Vec3; 8],
}

impl Frustum {
    /// Build from a view-projection matrix using glam's `[0, 1]` depth range.
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|plane| {
            let length = plane.truncate().length();
            if length > 0.0 {
                plane / length
            } else {
                plane
            }
        });

        let inverse = view_projection.inverse();
        let mut corners = [Vec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let ndc = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { 0.0 } else { 1.0 },
            );
            *corner = inverse.project_point3(ndc);
        }

        Self { planes, corners }
    }

    pub fn planes(&self) -> &[Vec4; 6] {
        &self.planes
    }

    pub fn bounding_box(&self) -> Aabb {
        Aabb::from_points(self.corners).unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }

    /// Conservative: boxes near the frustum's edges may be reported as
    /// intersecting even though they are just outside.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            normal.dot(positive) + plane.w >= 0.0
        })
    }
}

/// World axis conventions, used to answer "which way is forward".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystem {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self {
            forward: Vec3::X,
            right: Vec3::Y,
            up: Vec3::Z,
        }
    }
}
