use nalgebra::DVector;

use super::system::MultibodySystem;
use crate::core::Transform;
use crate::utils::SpatialVec;

/// Continuous state of a multibody system.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub time: f64,
    /// Generalized coordinates.
    pub q: DVector<f64>,
    /// Generalized speeds.
    pub u: DVector<f64>,
}

impl State {
    pub fn new(q: DVector<f64>, u: DVector<f64>) -> Self {
        Self { time: 0.0, q, u }
    }

    pub fn is_finite(&self) -> bool {
        self.time.is_finite() && self.q.iter().chain(self.u.iter()).all(|v| v.is_finite())
    }

    /// `self + h * rate`, leaving time untouched.
    pub fn offset(&self, rate: &StateDerivative, h: f64) -> State {
        State {
            time: self.time,
            q: &self.q + &rate.q_dot * h,
            u: &self.u + &rate.u_dot * h,
        }
    }
}

/// Time derivative of a [`State`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateDerivative {
    pub q_dot: DVector<f64>,
    pub u_dot: DVector<f64>,
}

/// Position and velocity quantities of every body, in ground coordinates.
#[derive(Debug, Clone)]
pub struct Kinematics {
    /// Body frame poses.
    pub poses: Vec<Transform>,
    pub velocities: Vec<SpatialVec>,
    /// Velocity-dependent part of each body's spatial acceleration.
    pub bias: Vec<SpatialVec>,
    /// Twist produced by a unit value of each generalized speed.
    pub columns: Vec<SpatialVec>,
}

impl Kinematics {
    /// Walks the tree outward from the ground.
    pub fn compute(system: &MultibodySystem, state: &State) -> Self {
        let n = system.bodies.len();
        let mut poses = vec![Transform::IDENTITY; n];
        let mut velocities = vec![SpatialVec::ZERO; n];
        let mut bias = vec![SpatialVec::ZERO; n];
        let mut columns = vec![SpatialVec::ZERO; system.nu()];

        for (i, body) in system.mobilized() {
            let parent = body.parent;
            let q = &state.q.as_slice()[body.q_offset..body.q_offset + body.nq()];
            let u = &state.u.as_slice()[body.u_offset..body.u_offset + body.nu()];

            let x_gf = poses[parent] * body.x_pf;
            let x_gm = x_gf * body.kind.transform(q);
            poses[i] = x_gm * body.x_bm.inverse();

            let v_parent = velocities[parent];
            let mut velocity = v_parent;
            let mut columns_dot = SpatialVec::ZERO;
            let mut outboard_axes = Vec::new();
            for (k, &speed) in u.iter().enumerate() {
                let axis = body.kind.axis(k);
                let s = axis.twist(x_gf.rotation, x_gm.rotation, x_gm.position);
                columns[body.u_offset + k] = s;
                velocity += s * speed;
                match axis.frame {
                    super::mobilizer::Attachment::Inboard => {
                        columns_dot += v_parent.cross_motion(&s) * speed;
                    }
                    super::mobilizer::Attachment::Outboard => outboard_axes.push((s, speed)),
                }
            }
            for (s, speed) in outboard_axes {
                columns_dot += velocity.cross_motion(&s) * speed;
            }
            velocities[i] = velocity;
            bias[i] = bias[parent] + columns_dot;
        }

        Self {
            poses,
            velocities,
            bias,
            columns,
        }
    }
}
