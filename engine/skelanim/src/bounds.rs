//! Bounding volumes, frustum culling and ray tests
//!
//! Everything here works in eye (camera) space with OpenGL clip conventions,
//! matching `Mat4::perspective_rh_gl`. Boxes are axis-aligned in their own
//! space and placed by a matrix, which makes them oriented boxes in eye space.

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point; `None` for an empty slice
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = *points.first()?;
        Some(points.iter().fold(Self::new(first, first), |b, &p| Self {
            min: b.min.min(p),
            max: b.max.max(p),
        }))
    }

    pub fn half_extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Whether the box has zero size along every axis
    pub fn is_degenerate(&self) -> bool {
        let size = self.size();
        !(size.x > 0.0 || size.y > 0.0 || size.z > 0.0)
    }
}

/// A plane `normal · p + d = 0`, normal pointing inside
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    /// Plane from a clip-space row combination, normalized
    pub fn from_row(row: Vec4) -> Self {
        let normal = row.truncate();
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                d: row.w / len,
            }
        } else {
            Self { normal, d: row.w }
        }
    }

    /// Signed distance, positive on the inner side
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// Six normalized frustum planes in eye space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes of an OpenGL-style projection (depth range [-1, 1])
    ///
    /// Pass a view-projection matrix instead to get world-space planes.
    pub fn from_projection(projection: &Mat4) -> Self {
        let row0 = projection.row(0);
        let row1 = projection.row(1);
        let row2 = projection.row(2);
        let row3 = projection.row(3);

        Self {
            planes: [
                Plane::from_row(row3 + row0),
                Plane::from_row(row3 - row0),
                Plane::from_row(row3 + row1),
                Plane::from_row(row3 - row1),
                Plane::from_row(row3 + row2),
                Plane::from_row(row3 - row2),
            ],
        }
    }

    /// Use already normalized planes (left, right, bottom, top, near, far)
    pub fn from_planes(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Whether a box placed by `matrix` reaches inside every plane
    ///
    /// For each plane the box corner furthest along the plane normal is
    /// picked per axis from the sign of the matrix column, then tested.
    pub fn intersects_obb(&self, aabb: &Aabb, matrix: &Mat4) -> bool {
        let axes = [
            matrix.x_axis.truncate(),
            matrix.y_axis.truncate(),
            matrix.z_axis.truncate(),
        ];
        self.planes.iter().all(|plane| {
            let mut corner = Vec3::ZERO;
            for (axis, column) in axes.iter().enumerate() {
                corner[axis] = if plane.normal.dot(*column) >= 0.0 {
                    aabb.max[axis]
                } else {
                    aabb.min[axis]
                };
            }
            // NaN distances count as inside
            let distance = plane.distance(matrix.transform_point3(corner));
            distance >= 0.0 || distance.is_nan()
        })
    }
}

/// A half-line in eye space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    /// Ray from `origin` along `dir` (normalized); `None` for a zero direction
    pub fn new(origin: Vec3, dir: Vec3) -> Option<Self> {
        let dir = dir.try_normalize()?;
        Some(Self { origin, dir })
    }

    /// Eye-space ray through a pixel
    ///
    /// `mouse` is in pixels from the top-left corner of a `viewport` of the
    /// given size. The near and far points are unprojected with
    /// `inverse_projection`.
    pub fn from_screen(mouse: Vec2, viewport: Vec2, inverse_projection: &Mat4) -> Option<Self> {
        if viewport.x <= 0.0 || viewport.y <= 0.0 {
            return None;
        }
        let ndc = Vec2::new(
            2.0 * mouse.x / viewport.x - 1.0,
            1.0 - 2.0 * mouse.y / viewport.y,
        );
        let near = inverse_projection.project_point3(ndc.extend(-1.0));
        let far = inverse_projection.project_point3(ndc.extend(1.0));
        if !near.is_finite() || !far.is_finite() {
            return None;
        }
        Self::new(near, far - near)
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.dir * t
    }

    /// Distance along the ray to a box placed by `matrix` (slab method)
    ///
    /// Returns 0 when the origin is inside the box. Singular matrices and
    /// non-finite intermediate values count as a miss.
    pub fn intersect_obb(&self, aabb: &Aabb, matrix: &Mat4) -> Option<f32> {
        let det = matrix.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let inverse = matrix.inverse();
        let origin = inverse.transform_point3(self.origin);
        let dir = inverse.transform_vector3(self.dir);

        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            if d.abs() < f32::EPSILON {
                if o < aabb.min[axis] || o > aabb.max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (aabb.min[axis] - o) / d;
            let t2 = (aabb.max[axis] - o) / d;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            return None;
        }
        let t = t_min.max(0.0);
        t.is_finite().then_some(t)
    }

    /// Closest approach between the ray and the segment `a..b`
    ///
    /// Returns the ray parameter and the distance between the two closest
    /// points. A segment collapsed to a point is handled as that point.
    pub fn closest_to_segment(&self, a: Vec3, b: Vec3) -> (f32, f32) {
        let seg = b - a;
        let w = self.origin - a;
        let seg_len2 = seg.length_squared();
        let dir_seg = self.dir.dot(seg);
        let denom = seg_len2 - dir_seg * dir_seg;

        let s = if seg_len2 <= f32::EPSILON {
            0.0
        } else if denom.abs() <= f32::EPSILON * seg_len2 {
            // Parallel: project the ray origin onto the segment
            (w.dot(seg) / seg_len2).clamp(0.0, 1.0)
        } else {
            ((w.dot(seg) - self.dir.dot(w) * dir_seg) / denom).clamp(0.0, 1.0)
        };

        let point = a + seg * s;
        let t = (point - self.origin).dot(self.dir).max(0.0);
        (t, self.at(t).distance(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection() -> Mat4 {
        Mat4::perspective_rh_gl(60f32.to_radians(), 1.0, 0.1, 100.0)
    }

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5))
    }

    #[test]
    fn test_planes_are_normalized() {
        let frustum = Frustum::from_projection(&projection());
        for plane in frustum.planes() {
            assert!((plane.normal.length() - 1.0).abs() < 1.0e-5);
        }
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let frustum = Frustum::from_projection(&projection());
        let m = Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0));
        assert!(frustum.intersects_obb(&unit_box(), &m));
    }

    #[test]
    fn test_box_behind_camera_is_culled() {
        let frustum = Frustum::from_projection(&projection());
        let m = Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0));
        assert!(!frustum.intersects_obb(&unit_box(), &m));
    }

    #[test]
    fn test_box_beyond_far_plane_is_culled() {
        let frustum = Frustum::from_projection(&projection());
        let m = Mat4::from_translation(Vec3::new(0.0, 0.0, -200.0));
        assert!(!frustum.intersects_obb(&unit_box(), &m));
    }

    #[test]
    fn test_rotated_box_straddling_side_plane() {
        let frustum = Frustum::from_projection(&projection());
        // Centre just outside the right plane, long axis rotated back into view
        let m = Mat4::from_translation(Vec3::new(6.5, 0.0, -10.0))
            * Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4)
            * Mat4::from_scale(Vec3::new(4.0, 1.0, 1.0));
        assert!(frustum.intersects_obb(&unit_box(), &m));
    }

    #[test]
    fn test_ray_hits_box() {
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        let m = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let t = ray.intersect_obb(&unit_box(), &m).unwrap();
        assert!((t - 4.5).abs() < 1.0e-5);
    }

    #[test]
    fn test_ray_misses_box() {
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        let m = Mat4::from_translation(Vec3::new(3.0, 0.0, -5.0));
        assert_eq!(ray.intersect_obb(&unit_box(), &m), None);
        let behind = Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(ray.intersect_obb(&unit_box(), &behind), None);
    }

    #[test]
    fn test_degenerate_inputs_miss() {
        assert_eq!(Ray::new(Vec3::ZERO, Vec3::ZERO), None);
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        assert_eq!(ray.intersect_obb(&unit_box(), &Mat4::ZERO), None);
    }

    #[test]
    fn test_screen_center_ray_points_forward() {
        let inverse = projection().inverse();
        let ray = Ray::from_screen(Vec2::new(400.0, 300.0), Vec2::new(800.0, 600.0), &inverse)
            .unwrap();
        assert!(ray.dir.abs_diff_eq(Vec3::NEG_Z, 1.0e-4));
        assert_eq!(Ray::from_screen(Vec2::ZERO, Vec2::ZERO, &inverse), None);
    }

    #[test]
    fn test_closest_to_segment() {
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).unwrap();
        let (t, dist) =
            ray.closest_to_segment(Vec3::new(1.0, -1.0, -4.0), Vec3::new(1.0, 1.0, -4.0));
        assert!((t - 4.0).abs() < 1.0e-5);
        assert!((dist - 1.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points(&[Vec3::ONE, Vec3::NEG_ONE, Vec3::X * 3.0]).unwrap();
        assert_eq!(aabb.min, Vec3::NEG_ONE);
        assert_eq!(aabb.max, Vec3::new(3.0, 1.0, 1.0));
        assert_eq!(aabb.half_extent(), Vec3::new(2.0, 1.0, 1.0));
        assert!(Aabb::from_points(&[]).is_none());
    }
}
