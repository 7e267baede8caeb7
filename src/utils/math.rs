//! Additional math helpers layered on top of `glam`.

use glam::{DMat3, DQuat, DVec3};

/// Rotation whose `canonical` axis is carried onto `axis`.
///
/// Degenerate (zero) axes fall back to identity.
pub fn rotation_aligning(canonical: DVec3, axis: DVec3) -> DQuat {
    let target = axis.normalize_or_zero();
    if target == DVec3::ZERO {
        return DQuat::IDENTITY;
    }
    DQuat::from_rotation_arc(canonical, target)
}

/// Rotation whose X axis is `first` and whose Y axis is `second`
/// orthogonalized against it.
pub fn frame_from_axes(first: DVec3, second: DVec3) -> DQuat {
    let x = first.normalize_or_zero();
    if x == DVec3::ZERO {
        return DQuat::IDENTITY;
    }
    let mut y = second - x * second.dot(x);
    if y.length_squared() < 1e-18 {
        y = x.any_orthonormal_vector();
    }
    let y = y.normalize();
    let z = x.cross(y);
    DQuat::from_mat3(&DMat3::from_cols(x, y, z)).normalize()
}

/// Time derivative of a unit quaternion for an angular velocity expressed in
/// the rotated (body) frame: q_dot = 0.5 * q * (0, w).
pub fn quat_derivative_body(q: DQuat, w_body: DVec3) -> DQuat {
    let omega = DQuat::from_xyzw(w_body.x, w_body.y, w_body.z, 0.0);
    (q * omega) * 0.5
}

/// Rotation vector taking `from` onto `to`, expressed in the common frame.
pub fn rotation_error(to: DQuat, from: DQuat) -> DVec3 {
    let mut delta = to * from.inverse();
    if delta.w < 0.0 {
        delta = -delta;
    }
    delta.to_scaled_axis()
}

/// Helper methods for inertia calculations.
pub trait InertiaTensorExt {
    fn for_solid_box(size: DVec3, mass: f64) -> DMat3;
    fn for_solid_sphere(radius: f64, mass: f64) -> DMat3;
    fn for_solid_cylinder(radius: f64, length: f64, mass: f64) -> DMat3;
}

impl InertiaTensorExt for DMat3 {
    /// `size` holds full extents.
    fn for_solid_box(size: DVec3, mass: f64) -> DMat3 {
        let factor = mass / 12.0;
        DMat3::from_diagonal(DVec3::new(
            factor * (size.y * size.y + size.z * size.z),
            factor * (size.x * size.x + size.z * size.z),
            factor * (size.x * size.x + size.y * size.y),
        ))
    }

    fn for_solid_sphere(radius: f64, mass: f64) -> DMat3 {
        DMat3::from_diagonal(DVec3::splat(0.4 * mass * radius * radius))
    }

    /// Cylinder aligned with Z.
    fn for_solid_cylinder(radius: f64, length: f64, mass: f64) -> DMat3 {
        let side = mass * (3.0 * radius * radius + length * length) / 12.0;
        DMat3::from_diagonal(DVec3::new(side, side, 0.5 * mass * radius * radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligning_rotation_maps_canonical_axis() {
        let axis = DVec3::new(1.0, 1.0, 0.0);
        let r = rotation_aligning(DVec3::Z, axis);
        assert!((r * DVec3::Z - axis.normalize()).length() < 1e-12);
    }

    #[test]
    fn frame_from_axes_is_orthonormal() {
        let r = frame_from_axes(DVec3::new(0.0, 0.0, 2.0), DVec3::new(1.0, 0.0, 1.0));
        assert!((r * DVec3::X - DVec3::Z).length() < 1e-12);
        assert!((r * DVec3::Y - DVec3::X).length() < 1e-12);
    }

    #[test]
    fn rotation_error_recovers_small_rotation() {
        let from = DQuat::from_rotation_z(0.3);
        let to = DQuat::from_rotation_z(0.5);
        let err = rotation_error(to, from);
        assert!((err - DVec3::new(0.0, 0.0, 0.2)).length() < 1e-12);
    }
}
