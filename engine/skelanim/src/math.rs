//! Interpolation and matrix helpers on top of `glam`
//!
//! The generic algebra (matrix multiply, invert, quaternion/matrix conversion)
//! comes straight from `glam`. This module adds the pieces the animation
//! pipeline needs on top of it: an epsilon-controlled slerp with shortest-path
//! correction, bit-exact comparisons used for "unchanged" detection, and
//! partial rebuilds of bone-space matrices.

use glam::{Mat3, Mat4, Quat, Vec3, Vec4};

/// Trait for values that can be interpolated between keyframes
pub trait Lerp: Copy {
    /// Interpolate from `self` toward `other` by `t` in `[0, 1]`
    ///
    /// `slerp_epsilon` only matters for rotations.
    fn interpolate(&self, other: &Self, t: f32, slerp_epsilon: f32) -> Self;

    /// Bit-exact equality, used to report "unchanged" samples
    fn bits_eq(&self, other: &Self) -> bool;
}

impl Lerp for f32 {
    fn interpolate(&self, other: &Self, t: f32, _slerp_epsilon: f32) -> Self {
        self + (other - self) * t
    }

    fn bits_eq(&self, other: &Self) -> bool {
        self.to_bits() == other.to_bits()
    }
}

impl Lerp for Vec3 {
    fn interpolate(&self, other: &Self, t: f32, _slerp_epsilon: f32) -> Self {
        Vec3::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
            self.z + (other.z - self.z) * t,
        )
    }

    fn bits_eq(&self, other: &Self) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Lerp for Quat {
    fn interpolate(&self, other: &Self, t: f32, slerp_epsilon: f32) -> Self {
        slerp(*self, *other, t, slerp_epsilon)
    }

    fn bits_eq(&self, other: &Self) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

/// Normalize a quaternion, substituting identity for a zero-length input
pub fn normalize_quat(q: Quat) -> Quat {
    let len_sq = q.length_squared();
    if len_sq > 0.0 && len_sq.is_finite() {
        q * len_sq.sqrt().recip()
    } else {
        Quat::IDENTITY
    }
}

/// Spherical linear interpolation with shortest-path correction
///
/// When the endpoints are closer than `epsilon` (measured as `1 - |dot|`)
/// this falls back to a renormalized linear interpolation.
pub fn slerp(from: Quat, to: Quat, t: f32, epsilon: f32) -> Quat {
    let mut dot = from.dot(to);

    // Take the shorter arc
    let to = if dot < 0.0 {
        dot = -dot;
        -to
    } else {
        to
    };

    if 1.0 - dot < epsilon {
        let q = Quat::from_xyzw(
            from.x + t * (to.x - from.x),
            from.y + t * (to.y - from.y),
            from.z + t * (to.z - from.z),
            from.w + t * (to.w - from.w),
        );
        return normalize_quat(q);
    }

    let theta_0 = dot.min(1.0).acos();
    let sin_theta_0 = theta_0.sin();
    if sin_theta_0.abs() <= f32::EPSILON {
        return normalize_quat(from);
    }

    let s0 = ((1.0 - t) * theta_0).sin() / sin_theta_0;
    let s1 = (t * theta_0).sin() / sin_theta_0;

    Quat::from_xyzw(
        s0 * from.x + s1 * to.x,
        s0 * from.y + s1 * to.y,
        s0 * from.z + s1 * to.z,
        s0 * from.w + s1 * to.w,
    )
}

/// Bit-exact matrix comparison
pub fn mat4_bits_eq(a: &Mat4, b: &Mat4) -> bool {
    a.to_cols_array()
        .iter()
        .zip(b.to_cols_array().iter())
        .all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Overwrite the rotation part of a bone-space matrix, keeping its translation
pub fn set_rotation(m: &mut Mat4, q: Quat) {
    let r = Mat3::from_quat(q);
    m.x_axis = r.x_axis.extend(0.0);
    m.y_axis = r.y_axis.extend(0.0);
    m.z_axis = r.z_axis.extend(0.0);
}

/// Overwrite the translation column of a bone-space matrix
pub fn set_translation(m: &mut Mat4, t: Vec3) {
    m.w_axis = Vec4::new(t.x, t.y, t.z, 1.0);
}

/// Extract the (normalized) rotation of a bone-space matrix
pub fn rotation_of(m: &Mat4) -> Quat {
    normalize_quat(Quat::from_mat3(&orthonormalize(Mat3::from_mat4(*m))))
}

/// Extract the translation column of a matrix
pub fn translation_of(m: &Mat4) -> Vec3 {
    m.w_axis.truncate()
}

/// Strip scale from a rotation matrix so `Quat::from_mat3` sees a pure rotation
fn orthonormalize(m: Mat3) -> Mat3 {
    let x = m.x_axis.normalize_or_zero();
    let y = m.y_axis.normalize_or_zero();
    let z = m.z_axis.normalize_or_zero();
    if x == Vec3::ZERO || y == Vec3::ZERO || z == Vec3::ZERO {
        return Mat3::IDENTITY;
    }
    Mat3::from_cols(x, y, z)
}

/// Rotation that takes Blender-style +Z-up coordinates to +Y-up
pub fn z_up_to_y_up() -> Mat4 {
    Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quat_close(a: Quat, b: Quat) -> bool {
        a.abs_diff_eq(b, 1.0e-5) || a.abs_diff_eq(-b, 1.0e-5)
    }

    #[test]
    fn test_vec3_lerp() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(10.0, 20.0, 30.0);

        let mid = a.interpolate(&b, 0.5, 0.0);
        assert!((mid.x - 5.0).abs() < 0.001);
        assert!((mid.y - 10.0).abs() < 0.001);
        assert!((mid.z - 15.0).abs() < 0.001);
    }

    #[test]
    fn test_slerp_endpoints() {
        let a = Quat::IDENTITY;
        let b = Quat::from_rotation_z(1.0);
        assert!(quat_close(slerp(a, b, 0.0, 1.0e-4), a));
        assert!(quat_close(slerp(a, b, 1.0, 1.0e-4), b));
    }

    #[test]
    fn test_slerp_midpoint() {
        let a = Quat::IDENTITY;
        let b = Quat::from_rotation_z(1.0);
        let mid = slerp(a, b, 0.5, 1.0e-4);
        assert!(quat_close(mid, Quat::from_rotation_z(0.5)));
    }

    #[test]
    fn test_slerp_shortest_path() {
        let a = Quat::IDENTITY;
        let b = -Quat::from_rotation_z(0.5);
        let mid = slerp(a, b, 0.5, 1.0e-4);
        // Negated endpoint must not send us the long way round
        assert!(quat_close(mid, Quat::from_rotation_z(0.25)));
        assert!(mid.w > 0.0);
    }

    #[test]
    fn test_slerp_epsilon_fallback_is_normalized() {
        let a = Quat::IDENTITY;
        let b = Quat::from_rotation_y(1.0e-3);
        let q = slerp(a, b, 0.3, 0.5);
        assert!((q.length() - 1.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_normalize_zero_quat() {
        let q = normalize_quat(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0));
        assert_eq!(q, Quat::IDENTITY);
    }

    #[test]
    fn test_bits_eq_distinguishes_signed_zero() {
        let a = Vec3::new(0.0, 1.0, 2.0);
        let b = Vec3::new(-0.0, 1.0, 2.0);
        assert!(a.bits_eq(&a));
        assert!(!a.bits_eq(&b));
    }

    #[test]
    fn test_set_rotation_keeps_translation() {
        let mut m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        set_rotation(&mut m, Quat::from_rotation_x(0.7));
        assert_eq!(translation_of(&m), Vec3::new(1.0, 2.0, 3.0));
        assert!(quat_close(rotation_of(&m), Quat::from_rotation_x(0.7)));
    }
}
