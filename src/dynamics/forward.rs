//! Forward dynamics in generalized coordinates.
//!
//! The mass matrix comes from composite rigid-body inertias, the velocity and
//! force dependent terms from a single outward/inward sweep, and slave welds are
//! enforced as acceleration-level Lagrange multipliers with Baumgarte
//! stabilization.

use nalgebra::{DMatrix, DVector};

use super::integrator::Dynamics;
use super::state::{Kinematics, State, StateDerivative};
use super::system::{AppliedLoads, MultibodySystem};
use crate::error::SolverError;
use crate::utils::{rotation_error, SpatialInertia, SpatialVec};

/// Relative diagonal regularization of the constraint matrix, absorbing redundant weld rows.
const WELD_REGULARIZATION: f64 = 1e-9;

/// Ground-frame spatial inertia of every body.
pub fn body_inertias(system: &MultibodySystem, kin: &Kinematics) -> Vec<SpatialInertia> {
    system
        .bodies
        .iter()
        .zip(&kin.poses)
        .map(|(body, pose)| {
            SpatialInertia::from_body(
                body.mass.mass,
                pose.transform_point(body.mass.center_of_mass),
                pose.rotation,
                body.mass.inertia,
            )
        })
        .collect()
}

/// Composite-rigid-body mass matrix.
pub fn mass_matrix(system: &MultibodySystem, kin: &Kinematics, inertias: &[SpatialInertia]) -> DMatrix<f64> {
    let nu = system.nu();
    let mut composite = inertias.to_vec();
    for i in (1..system.bodies.len()).rev() {
        let parent = system.bodies[i].parent;
        if parent != i {
            composite[parent] = composite[parent].add(&composite[i]);
        }
    }

    let mut h = DMatrix::zeros(nu, nu);
    for (i, body) in system.mobilized() {
        for k in 0..body.nu() {
            let row = body.u_offset + k;
            let momentum = composite[i].mul_motion(kin.columns[row]);
            let mut j = i;
            while j != 0 {
                let ancestor = &system.bodies[j];
                for l in 0..ancestor.nu() {
                    let col = ancestor.u_offset + l;
                    let value = kin.columns[col].dot(&momentum);
                    h[(row, col)] = value;
                    h[(col, row)] = value;
                }
                j = ancestor.parent;
            }
        }
    }
    h
}

/// Generalized forces `tau - C(q, u)`: applied, gravity, damping, contact,
/// gyroscopic and Coriolis terms.
pub fn generalized_forces(
    system: &MultibodySystem,
    state: &State,
    kin: &Kinematics,
    inertias: &[SpatialInertia],
    loads: &AppliedLoads,
) -> DVector<f64> {
    let n = system.bodies.len();
    let mut external = loads.body_forces.clone();
    external.resize(n, SpatialVec::ZERO);
    system.contact.accumulate(
        &system.surfaces,
        &system.contact_pairs,
        &kin.poses,
        &kin.velocities,
        &mut external,
    );

    // Net force each body must receive to follow its bias acceleration.
    let mut subtree = vec![SpatialVec::ZERO; n];
    for (i, inertia) in inertias.iter().enumerate().skip(1) {
        let weight = SpatialVec::force_at(system.gravity * inertia.mass, inertia.com);
        let v = kin.velocities[i];
        subtree[i] = inertia.mul_motion(kin.bias[i]) + v.cross_force(&inertia.mul_motion(v))
            - external[i]
            - weight;
    }
    for i in (1..n).rev() {
        let parent = system.bodies[i].parent;
        if parent != 0 {
            let f = subtree[i];
            subtree[parent] += f;
        }
    }

    let mut tau = DVector::zeros(system.nu());
    for (i, body) in system.mobilized() {
        for k in 0..body.nu() {
            let idx = body.u_offset + k;
            tau[idx] = loads.mobility_forces.get(idx).copied().unwrap_or(0.0)
                - body.damping * state.u[idx]
                - kin.columns[idx].dot(&subtree[i]);
        }
    }
    tau
}

/// Jacobian rows mapping generalized speeds to the ground-frame twist of `body`.
fn body_jacobian(system: &MultibodySystem, kin: &Kinematics, body: usize, sign: f64, out: &mut DMatrix<f64>, row0: usize) {
    let mut j = body;
    while j != 0 {
        let b = &system.bodies[j];
        for l in 0..b.nu() {
            let col = b.u_offset + l;
            let s = kin.columns[col] * sign;
            out[(row0, col)] += s.ang.x;
            out[(row0 + 1, col)] += s.ang.y;
            out[(row0 + 2, col)] += s.ang.z;
            out[(row0 + 3, col)] += s.lin.x;
            out[(row0 + 4, col)] += s.lin.y;
            out[(row0 + 5, col)] += s.lin.z;
        }
        j = b.parent;
    }
}

fn write_rows(rhs: &mut DVector<f64>, row0: usize, v: SpatialVec) {
    rhs[row0] = v.ang.x;
    rhs[row0 + 1] = v.ang.y;
    rhs[row0 + 2] = v.ang.z;
    rhs[row0 + 3] = v.lin.x;
    rhs[row0 + 4] = v.lin.y;
    rhs[row0 + 5] = v.lin.z;
}

/// Weld constraint matrix `G` and acceleration target `b` with `G u_dot = b`.
pub fn weld_constraints(system: &MultibodySystem, kin: &Kinematics) -> (DMatrix<f64>, DVector<f64>) {
    let rows = 6 * system.welds.len();
    let mut g = DMatrix::zeros(rows, system.nu());
    let mut b = DVector::zeros(rows);
    let alpha = system.weld_stabilization;

    for (w, weld) in system.welds.iter().enumerate() {
        let row0 = 6 * w;
        body_jacobian(system, kin, weld.master, 1.0, &mut g, row0);
        body_jacobian(system, kin, weld.slave, -1.0, &mut g, row0);

        let master = kin.poses[weld.master];
        let slave = kin.poses[weld.slave];
        let theta = rotation_error(master.rotation, slave.rotation);
        let p = slave.position;
        let error = SpatialVec::new(theta, (master.position - slave.position) + p.cross(theta));

        let bias = kin.bias[weld.master] - kin.bias[weld.slave];
        let velocity = kin.velocities[weld.master] - kin.velocities[weld.slave];
        write_rows(
            &mut b,
            row0,
            -bias - velocity * (2.0 * alpha) - error * (alpha * alpha),
        );
    }
    (g, b)
}

/// Generalized accelerations for `state` under `loads`.
pub fn accelerations(
    system: &MultibodySystem,
    state: &State,
    loads: &AppliedLoads,
) -> Result<DVector<f64>, SolverError> {
    if system.nu() == 0 {
        return Ok(DVector::zeros(0));
    }
    let kin = Kinematics::compute(system, state);
    let inertias = body_inertias(system, &kin);
    let h = mass_matrix(system, &kin, &inertias);
    let tau = generalized_forces(system, state, &kin, &inertias, loads);

    let singular = || SolverError::SingularMassMatrix { time: state.time };
    let chol = h.cholesky().ok_or_else(singular)?;
    let mut u_dot = chol.solve(&tau);
    if system.welds.is_empty() {
        return Ok(u_dot);
    }

    let (g, b) = weld_constraints(system, &kin);
    let h_inv_gt = chol.solve(&g.transpose());
    let mut schur = &g * &h_inv_gt;
    let scale = schur.diagonal().amax().max(1.0);
    for i in 0..schur.nrows() {
        schur[(i, i)] += WELD_REGULARIZATION * scale;
    }
    let residual = b - &g * &u_dot;
    let lambda = schur.cholesky().ok_or_else(singular)?.solve(&residual);
    u_dot += h_inv_gt * lambda;
    Ok(u_dot)
}

/// Coordinate rates for the speeds in `state`.
pub fn coordinate_rates(system: &MultibodySystem, state: &State) -> DVector<f64> {
    let mut q_dot = DVector::zeros(system.nq());
    for (_, body) in system.mobilized() {
        let q = &state.q.as_slice()[body.q_offset..body.q_offset + body.nq()];
        let u = &state.u.as_slice()[body.u_offset..body.u_offset + body.nu()];
        let out = &mut q_dot.as_mut_slice()[body.q_offset..body.q_offset + body.nq()];
        body.kind.q_dot(q, u, out);
    }
    q_dot
}

/// A system together with the loads acting on it for one outer step.
pub struct LoadedSystem<'a> {
    pub system: &'a MultibodySystem,
    pub loads: &'a AppliedLoads,
}

impl Dynamics for LoadedSystem<'_> {
    fn derivative(&self, state: &State) -> Result<StateDerivative, SolverError> {
        Ok(StateDerivative {
            q_dot: coordinate_rates(self.system, state),
            u_dot: accelerations(self.system, state, self.loads)?,
        })
    }

    fn project(&self, state: &mut State) {
        self.system.project(state);
    }
}
