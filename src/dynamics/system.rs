use std::collections::HashMap;

use glam::DVec3;
use nalgebra::DVector;

use super::contact::{ContactModel, ContactSurface};
use super::graph::SlaveId;
use super::mobilizer::MobilizerKind;
use super::state::State;
use crate::core::{JointId, LinkId, MassProperties, Transform};
use crate::utils::{ModelId, SpatialVec};

/// What a backend body stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyRole {
    Ground,
    /// Canonical body of a link.
    Master { model: ModelId, link: LinkId },
    /// Loop-cutting duplicate of a link, welded to the link's master.
    Slave {
        model: ModelId,
        link: LinkId,
        slave: SlaveId,
    },
}

impl BodyRole {
    pub fn is_master(&self) -> bool {
        matches!(self, BodyRole::Master { .. })
    }
}

/// Stable identity of a mobilizer across rebuilds of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MobilizerKey {
    pub model: ModelId,
    pub link: LinkId,
    pub slave: Option<SlaveId>,
}

/// A body of the backend tree together with the mobilizer connecting it to its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendBody {
    pub role: BodyRole,
    /// Inboard body index; the ground is its own parent.
    pub parent: usize,
    pub kind: MobilizerKind,
    /// Inboard frame F in the parent body frame.
    pub x_pf: Transform,
    /// Outboard frame M in this body's frame.
    pub x_bm: Transform,
    pub q_offset: usize,
    pub u_offset: usize,
    /// Mass share in the body frame.
    pub mass: MassProperties,
    /// Viscous damping per mobility.
    pub damping: f64,
    /// Joint realized by the mobilizer; `None` for added base mobilizers.
    pub joint: Option<JointId>,
    /// The joint is traversed child-to-parent.
    pub reversed: bool,
    pub default_q: Vec<f64>,
}

impl BackendBody {
    pub fn ground() -> Self {
        Self {
            role: BodyRole::Ground,
            parent: 0,
            kind: MobilizerKind::Weld,
            x_pf: Transform::IDENTITY,
            x_bm: Transform::IDENTITY,
            q_offset: 0,
            u_offset: 0,
            mass: MassProperties::new(0.0, DVec3::ZERO, glam::DMat3::ZERO),
            damping: 0.0,
            joint: None,
            reversed: false,
            default_q: Vec::new(),
        }
    }

    pub fn nq(&self) -> usize {
        self.kind.nq()
    }

    pub fn nu(&self) -> usize {
        self.kind.nu()
    }

    pub fn key(&self) -> Option<MobilizerKey> {
        match self.role {
            BodyRole::Ground => None,
            BodyRole::Master { model, link } => Some(MobilizerKey {
                model,
                link,
                slave: None,
            }),
            BodyRole::Slave { model, link, slave } => Some(MobilizerKey {
                model,
                link,
                slave: Some(slave),
            }),
        }
    }

    /// Maps a joint axis to this mobilizer's speed index and the sign relating
    /// the joint's own coordinate to the mobilizer's.
    ///
    /// Reversed mobilizers see the inverse motion; a reversed universal also
    /// swaps its two axes.
    pub fn joint_axis(&self, axis: usize) -> Option<(usize, f64)> {
        let nu = self.nu();
        if axis >= nu {
            return None;
        }
        if !self.reversed {
            return Some((axis, 1.0));
        }
        match self.kind {
            MobilizerKind::Pin | MobilizerKind::Slider | MobilizerKind::Screw { .. } => {
                Some((0, -1.0))
            }
            MobilizerKind::Universal => Some((1 - axis, -1.0)),
            MobilizerKind::Free | MobilizerKind::Ball | MobilizerKind::Weld => None,
        }
    }
}

/// Rigid constraint holding a slave body onto its master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Weld {
    pub master: usize,
    pub slave: usize,
}

/// One-shot loads applied by callers between steps.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedLoads {
    /// Ground-frame spatial force per backend body (moment about the ground origin).
    pub body_forces: Vec<SpatialVec>,
    /// Generalized force per mobility.
    pub mobility_forces: DVector<f64>,
}

impl AppliedLoads {
    pub fn new(num_bodies: usize, nu: usize) -> Self {
        Self {
            body_forces: vec![SpatialVec::ZERO; num_bodies],
            mobility_forces: DVector::zeros(nu),
        }
    }

    pub fn clear(&mut self) {
        self.body_forces.fill(SpatialVec::ZERO);
        self.mobility_forces.fill(0.0);
    }
}

/// Link of a static model, fixed to the ground at `pose`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundedLink {
    pub model: ModelId,
    pub link: LinkId,
    pub pose: Transform,
}

/// Coordinates saved from one system and restorable into a rebuilt one.
pub type StateSnapshot = HashMap<MobilizerKey, (Vec<f64>, Vec<f64>)>;

/// Backend mechanical system assembled from every initialised model.
#[derive(Debug, Clone)]
pub struct MultibodySystem {
    /// Bodies in topological order; index 0 is the ground.
    pub bodies: Vec<BackendBody>,
    pub welds: Vec<Weld>,
    pub surfaces: Vec<ContactSurface>,
    /// Surface index pairs allowed to touch.
    pub contact_pairs: Vec<(usize, usize)>,
    pub num_cliques: usize,
    pub grounded: Vec<GroundedLink>,
    pub gravity: DVec3,
    pub weld_stabilization: f64,
    pub contact: ContactModel,
    pub(crate) nq: usize,
    pub(crate) nu: usize,
    pub(crate) masters: HashMap<(ModelId, LinkId), usize>,
    pub(crate) joints: HashMap<(ModelId, JointId), usize>,
}

impl MultibodySystem {
    pub fn nq(&self) -> usize {
        self.nq
    }

    pub fn nu(&self) -> usize {
        self.nu
    }

    /// Mobilized bodies, excluding the ground.
    pub fn mobilized(&self) -> impl Iterator<Item = (usize, &BackendBody)> {
        self.bodies.iter().enumerate().skip(1)
    }

    pub fn num_mobilizers(&self) -> usize {
        self.bodies.len() - 1
    }

    pub fn num_masters(&self) -> usize {
        self.bodies.iter().filter(|b| b.role.is_master()).count()
    }

    pub fn num_slaves(&self) -> usize {
        self.bodies
            .iter()
            .filter(|b| matches!(b.role, BodyRole::Slave { .. }))
            .count()
    }

    /// Mobilizers of the given kind name (`"pin"`, `"free"`, ...).
    pub fn count_kind(&self, name: &str) -> usize {
        self.mobilized().filter(|(_, b)| b.kind.name() == name).count()
    }

    pub fn master_body(&self, model: ModelId, link: LinkId) -> Option<usize> {
        self.masters.get(&(model, link)).copied()
    }

    pub fn joint_body(&self, model: ModelId, joint: JointId) -> Option<usize> {
        self.joints.get(&(model, joint)).copied()
    }

    /// State at the default configuration and rest.
    pub fn default_state(&self) -> State {
        let mut q = DVector::zeros(self.nq);
        for (_, body) in self.mobilized() {
            for (k, value) in body.default_q.iter().enumerate() {
                q[body.q_offset + k] = *value;
            }
        }
        State::new(q, DVector::zeros(self.nu))
    }

    pub fn new_loads(&self) -> AppliedLoads {
        AppliedLoads::new(self.bodies.len(), self.nu)
    }

    /// Re-normalises quaternion coordinates.
    pub fn project(&self, state: &mut State) {
        for (_, body) in self.mobilized() {
            if body.kind.has_quaternion() {
                let range = body.q_offset..body.q_offset + body.nq();
                body.kind.normalize(&mut state.q.as_mut_slice()[range]);
            }
        }
    }

    /// Per-mobilizer coordinates of `state`, keyed by mobilizer identity.
    pub fn snapshot(&self, state: &State) -> StateSnapshot {
        self.mobilized()
            .filter_map(|(_, body)| {
                let key = body.key()?;
                let q = state.q.rows(body.q_offset, body.nq()).iter().copied().collect();
                let u = state.u.rows(body.u_offset, body.nu()).iter().copied().collect();
                Some((key, (q, u)))
            })
            .collect()
    }

    /// Copies saved coordinates into `state` for every mobilizer that still
    /// exists with the same shape.
    pub fn restore(&self, state: &mut State, snapshot: &StateSnapshot) -> usize {
        let mut restored = 0;
        for (_, body) in self.mobilized() {
            let Some((q, u)) = body.key().and_then(|key| snapshot.get(&key)) else {
                continue;
            };
            if q.len() != body.nq() || u.len() != body.nu() {
                continue;
            }
            state.q.rows_mut(body.q_offset, body.nq()).copy_from_slice(q);
            state.u.rows_mut(body.u_offset, body.nu()).copy_from_slice(u);
            restored += 1;
        }
        restored
    }
}
