use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Rigid transform (position and orientation) of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: DVec3,
    pub rotation: DQuat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    pub fn new(position: DVec3, rotation: DQuat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_rotation(rotation: DQuat) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * other.position,
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.inverse();
        Transform {
            position: -(rotation * self.position),
            rotation,
        }
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.position + self.rotation * point
    }

    pub fn transform_vector(&self, vector: DVec3) -> DVec3 {
        self.rotation * vector
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }

    pub fn abs_diff_eq(&self, other: &Transform, max_abs_diff: f64) -> bool {
        let same_rotation = self.rotation.abs_diff_eq(other.rotation, max_abs_diff)
            || self.rotation.abs_diff_eq(-other.rotation, max_abs_diff);
        self.position.abs_diff_eq(other.position, max_abs_diff) && same_rotation
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;
    fn mul(self, rhs: Transform) -> Transform {
        self.combine(&rhs)
    }
}

/// Mass, center of mass, and inertia tensor of a link.
///
/// `center_of_mass` is given in the link frame; `inertia` is taken about the
/// center of mass in link axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub center_of_mass: DVec3,
    pub inertia: DMat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            center_of_mass: DVec3::ZERO,
            inertia: DMat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub fn new(mass: f64, center_of_mass: DVec3, inertia: DMat3) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }

    /// Share carried by each of `fragments` bodies representing one link.
    pub fn split(&self, fragments: usize) -> MassProperties {
        let n = fragments.max(1) as f64;
        MassProperties {
            mass: self.mass / n,
            center_of_mass: self.center_of_mass,
            inertia: self.inertia * (1.0 / n),
        }
    }
}

/// Compliant contact coefficients attached to a collision shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactMaterial {
    /// Normal stiffness (N/m^1.5).
    pub stiffness: f64,
    /// Hunt-Crossley dissipation (s/m).
    pub dissipation: f64,
    pub static_friction: f64,
    pub dynamic_friction: f64,
    /// Friction coefficient per unit slip speed (s/m).
    pub viscous_friction: f64,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            stiffness: 1e6,
            dissipation: 0.1,
            static_friction: 0.7,
            dynamic_friction: 0.5,
            viscous_friction: 0.5,
        }
    }
}

impl ContactMaterial {
    pub fn new(
        stiffness: f64,
        dissipation: f64,
        static_friction: f64,
        dynamic_friction: f64,
        viscous_friction: f64,
    ) -> Self {
        Self {
            stiffness,
            dissipation,
            static_friction,
            dynamic_friction,
            viscous_friction,
        }
    }

    /// Effective material of a contact between two surfaces.
    ///
    /// Stiffnesses act in series, dissipation is weighted by the compliance
    /// share of each side and friction coefficients mix harmonically.
    pub fn combine(a: &ContactMaterial, b: &ContactMaterial) -> ContactMaterial {
        let k_sum = a.stiffness + b.stiffness;
        let (stiffness, share_a) = if k_sum > 0.0 {
            (a.stiffness * b.stiffness / k_sum, b.stiffness / k_sum)
        } else {
            (0.0, 0.5)
        };
        let share_b = 1.0 - share_a;
        ContactMaterial {
            stiffness,
            dissipation: share_a * a.dissipation + share_b * b.dissipation,
            static_friction: harmonic(a.static_friction, b.static_friction),
            dynamic_friction: harmonic(a.dynamic_friction, b.dynamic_friction),
            viscous_friction: harmonic(a.viscous_friction, b.viscous_friction),
        }
    }
}

fn harmonic(a: f64, b: f64) -> f64 {
    let sum = a + b;
    if sum.abs() < f64::EPSILON {
        0.0
    } else {
        2.0 * a * b / sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_inverse_round_trips() {
        let t = Transform::new(DVec3::new(1.0, 2.0, 3.0), DQuat::from_rotation_y(0.7));
        let identity = t * t.inverse();
        assert!(identity.abs_diff_eq(&Transform::IDENTITY, 1e-12));
    }

    #[test]
    fn identical_materials_combine_to_half_stiffness() {
        let m = ContactMaterial::default();
        let pair = ContactMaterial::combine(&m, &m);
        assert!((pair.stiffness - 0.5e6).abs() < 1e-6);
        assert!((pair.dissipation - m.dissipation).abs() < 1e-12);
        assert!((pair.static_friction - m.static_friction).abs() < 1e-12);
    }

    #[test]
    fn split_divides_mass_and_inertia() {
        let props = MassProperties::new(6.0, DVec3::X, DMat3::IDENTITY * 3.0);
        let share = props.split(3);
        assert!((share.mass - 2.0).abs() < 1e-12);
        assert!((share.inertia.x_axis.x - 1.0).abs() < 1e-12);
        assert_eq!(share.center_of_mass, DVec3::X);
    }
}
