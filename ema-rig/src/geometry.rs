//! Conversions between the engine's bone-local matrices and rig pose matrices.
//!
//! Engine matrices are expressed relative to the parent's bind pose; rig pose matrices are
//! expressed relative to the bone's own rest matrix. Both directions share the same operands so
//! `to_engine_space(to_rig_space(m, ..), ..) == m` up to float noise.

use glam::{Mat4, Quat, Vec3};

/// Converts a rig pose (basis) matrix into the engine's bone-local convention.
pub fn to_engine_space(pose: Mat4, rest: Mat4, bind: Mat4, parent_bind_inverse: Mat4) -> Mat4 {
    parent_bind_inverse.inverse() * rest * pose * rest.inverse() * bind.inverse()
}

/// Converts an engine bone-local matrix into a rig pose (basis) matrix.
pub fn to_rig_space(engine: Mat4, rest: Mat4, bind: Mat4, parent_bind_inverse: Mat4) -> Mat4 {
    rest.inverse() * parent_bind_inverse * engine * bind * rest
}

/// Quaternion from XYZ Euler angles in radians (`x` roll, `y` pitch, `z` yaw).
pub fn quat_from_euler(angles: Vec3) -> Quat {
    let (sr, cr) = (angles.x * 0.5).sin_cos();
    let (sp, cp) = (angles.y * 0.5).sin_cos();
    let (sy, cy) = (angles.z * 0.5).sin_cos();

    Quat::from_xyzw(
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
        cr * cp * cy + sr * sp * sy,
    )
}

/// Inverse of [`quat_from_euler`]; pitch is clamped at the poles.
pub fn euler_from_quat(q: Quat) -> Vec3 {
    let (x, y, z, w) = (q.x, q.y, q.z, q.w);

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    Vec3::new(roll, pitch, yaw)
}

/// Rounds to `digits` decimal places.
pub fn round_to(value: f32, digits: i32) -> f32 {
    let scale = 10f64.powi(digits);
    ((value as f64 * scale).round() / scale) as f32
}

/// Rounds each component to 6 decimals, matching how parent scale is inherited.
pub(crate) fn round_scale(scale: Vec3) -> Vec3 {
    Vec3::new(round_to(scale.x, 6), round_to(scale.y, 6), round_to(scale.z, 6))
}

/// Some unit vector orthogonal to `v` (which must be non-zero).
pub(crate) fn any_orthonormal(v: Vec3) -> Vec3 {
    v.normalize_or_zero().any_orthonormal_vector()
}
