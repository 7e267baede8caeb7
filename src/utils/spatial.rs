use glam::{DMat3, DQuat, DVec3};

/// A 6D spatial vector combining angular and linear components.
///
/// All spatial quantities in the solver are Plücker coordinates expressed in
/// the ground frame and taken about the ground origin. For a motion vector,
/// `ang` is angular velocity and `lin` the velocity of the body point currently
/// at the origin. For a force vector, `ang` is the moment about the origin and
/// `lin` the force.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialVec {
    pub ang: DVec3,
    pub lin: DVec3,
}

impl SpatialVec {
    pub const ZERO: SpatialVec = SpatialVec {
        ang: DVec3::ZERO,
        lin: DVec3::ZERO,
    };

    pub fn new(ang: DVec3, lin: DVec3) -> Self {
        Self { ang, lin }
    }

    /// Unit twist of a rotation about the line through `point` along `axis`.
    pub fn rotation_about(axis: DVec3, point: DVec3) -> Self {
        Self::new(axis, point.cross(axis))
    }

    /// Unit twist of a translation along `direction`.
    pub fn translation_along(direction: DVec3) -> Self {
        Self::new(DVec3::ZERO, direction)
    }

    /// Force `force` applied at `point`.
    pub fn force_at(force: DVec3, point: DVec3) -> Self {
        Self::new(point.cross(force), force)
    }

    /// Pure couple.
    pub fn torque(torque: DVec3) -> Self {
        Self::new(torque, DVec3::ZERO)
    }

    /// Pairing of a motion vector with a force vector (power).
    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.ang.dot(other.ang) + self.lin.dot(other.lin)
    }

    /// Spatial motion cross product: v x_m m
    pub fn cross_motion(&self, other: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang.cross(other.ang),
            lin: self.ang.cross(other.lin) + self.lin.cross(other.ang),
        }
    }

    /// Spatial force cross product: v x_f f
    pub fn cross_force(&self, other: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang.cross(other.ang) + self.lin.cross(other.lin),
            lin: self.ang.cross(other.lin),
        }
    }

    /// Velocity of the body point currently located at `point`.
    pub fn point_velocity(&self, point: DVec3) -> DVec3 {
        self.lin + self.ang.cross(point)
    }

    pub fn is_finite(&self) -> bool {
        self.ang.is_finite() && self.lin.is_finite()
    }
}

impl std::ops::Add for SpatialVec {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            ang: self.ang + other.ang,
            lin: self.lin + other.lin,
        }
    }
}

impl std::ops::AddAssign for SpatialVec {
    fn add_assign(&mut self, other: Self) {
        self.ang += other.ang;
        self.lin += other.lin;
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            ang: self.ang - other.ang,
            lin: self.lin - other.lin,
        }
    }
}

impl std::ops::SubAssign for SpatialVec {
    fn sub_assign(&mut self, other: Self) {
        self.ang -= other.ang;
        self.lin -= other.lin;
    }
}

impl std::ops::Neg for SpatialVec {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            ang: -self.ang,
            lin: -self.lin,
        }
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            ang: self.ang * rhs,
            lin: self.lin * rhs,
        }
    }
}

/// Rigid-body inertia expressed in the ground frame.
///
/// `com` is the world position of the center of mass and `inertia` the
/// rotational inertia about it, both in ground axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialInertia {
    pub mass: f64,
    pub com: DVec3,
    pub inertia: DMat3,
}

impl Default for SpatialInertia {
    fn default() -> Self {
        Self::ZERO
    }
}

impl SpatialInertia {
    pub const ZERO: SpatialInertia = SpatialInertia {
        mass: 0.0,
        com: DVec3::ZERO,
        inertia: DMat3::ZERO,
    };

    pub fn new(mass: f64, com: DVec3, inertia: DMat3) -> Self {
        Self { mass, com, inertia }
    }

    /// Places a body-frame inertia (about the COM) at a world pose.
    pub fn from_body(mass: f64, com_world: DVec3, rotation: DQuat, body_inertia: DMat3) -> Self {
        let r = DMat3::from_quat(rotation);
        Self {
            mass,
            com: com_world,
            inertia: r * body_inertia * r.transpose(),
        }
    }

    /// Multiplies spatial inertia by spatial motion to get spatial momentum.
    pub fn mul_motion(&self, v: SpatialVec) -> SpatialVec {
        let m = self.mass;
        let c = self.com;
        let v_com = v.lin + v.ang.cross(c);
        SpatialVec {
            ang: self.inertia * v.ang + c.cross(v_com * m),
            lin: v_com * m,
        }
    }

    /// Sum of two inertias, re-expressed about the combined center of mass.
    pub fn add(&self, other: &Self) -> Self {
        let m_total = self.mass + other.mass;
        if m_total < 1e-12 {
            return Self {
                mass: m_total,
                com: self.com,
                inertia: self.inertia + other.inertia,
            };
        }

        let com_total = (self.com * self.mass + other.com * other.mass) / m_total;
        let i1 = self.inertia + parallel_axis(self.com - com_total, self.mass);
        let i2 = other.inertia + parallel_axis(other.com - com_total, other.mass);

        Self {
            mass: m_total,
            com: com_total,
            inertia: i1 + i2,
        }
    }
}

/// Inertia of a point mass `m` at offset `d`: m (|d|^2 I - d d^T).
fn parallel_axis(d: DVec3, m: f64) -> DMat3 {
    let outer = DMat3::from_cols(d * d.x, d * d.y, d * d.z);
    (DMat3::from_diagonal(DVec3::splat(d.length_squared())) - outer) * m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn momentum_of_translating_point_mass() {
        let inertia = SpatialInertia::new(2.0, DVec3::new(1.0, 0.0, 0.0), DMat3::ZERO);
        let twist = SpatialVec::translation_along(DVec3::Y);
        let h = inertia.mul_motion(twist);
        assert!((h.lin - DVec3::new(0.0, 2.0, 0.0)).length() < 1e-12);
        // r x p = (1,0,0) x (0,2,0)
        assert!((h.ang - DVec3::new(0.0, 0.0, 2.0)).length() < 1e-12);
    }

    #[test]
    fn combined_inertia_uses_parallel_axis() {
        let a = SpatialInertia::new(1.0, DVec3::new(-1.0, 0.0, 0.0), DMat3::ZERO);
        let b = SpatialInertia::new(1.0, DVec3::new(1.0, 0.0, 0.0), DMat3::ZERO);
        let sum = a.add(&b);
        assert!((sum.mass - 2.0).abs() < 1e-12);
        assert!(sum.com.length() < 1e-12);
        assert!((sum.inertia.z_axis.z - 2.0).abs() < 1e-12);
        assert!(sum.inertia.x_axis.x.abs() < 1e-12);
    }

    #[test]
    fn rotation_twist_moves_points_tangentially() {
        let twist = SpatialVec::rotation_about(DVec3::Z, DVec3::new(1.0, 0.0, 0.0));
        assert!(twist.point_velocity(DVec3::new(1.0, 0.0, 0.0)).length() < 1e-12);
        let v = twist.point_velocity(DVec3::new(2.0, 0.0, 0.0));
        assert!((v - DVec3::Y).length() < 1e-12);
    }
}
