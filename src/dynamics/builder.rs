//! Assembly of the backend system from model graphs.

use std::collections::HashMap;

use glam::{DQuat, DVec3};

use super::contact::{contact_pairs, ContactGeometry, ContactModel, ContactSurface};
use super::graph::{GraphMobilizer, MobilizerSource, MultibodyGraph};
use super::mobilizer::MobilizerKind;
use super::system::{BackendBody, BodyRole, GroundedLink, MultibodySystem, Weld};
use crate::core::{Collision, Joint, LinkId, Model, Shape, Transform};
use crate::utils::{frame_from_axes, rotation_aligning, ModelId};

/// Counts of what one model contributed to the system.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModelSummary {
    pub mobilizers: usize,
    pub slaves: usize,
    pub welds: usize,
    pub surfaces: usize,
    pub skipped_shapes: usize,
}

/// Frames and default coordinates of one joint mobilizer.
struct JointFrames {
    kind: MobilizerKind,
    x_pf: Transform,
    x_bm: Transform,
    default_q: Vec<f64>,
}

/// Incrementally builds a [`MultibodySystem`] from models in topological order.
pub struct SystemBuilder {
    system: MultibodySystem,
}

impl SystemBuilder {
    pub fn new(gravity: DVec3, transition_velocity: f64, weld_stabilization: f64) -> Self {
        Self {
            system: MultibodySystem {
                bodies: vec![BackendBody::ground()],
                welds: Vec::new(),
                surfaces: Vec::new(),
                contact_pairs: Vec::new(),
                num_cliques: 0,
                grounded: Vec::new(),
                gravity,
                weld_stabilization,
                contact: ContactModel::new(transition_velocity),
                nq: 0,
                nu: 0,
                masters: HashMap::new(),
                joints: HashMap::new(),
            },
        }
    }

    /// Attaches every link of a static model, and its collision shapes, to the ground.
    pub fn add_static_model(&mut self, id: ModelId, model: &Model) -> ModelSummary {
        let mut summary = ModelSummary::default();
        for (i, link) in model.links().iter().enumerate() {
            let pose = model.pose * link.pose;
            self.system.grounded.push(GroundedLink {
                model: id,
                link: LinkId(i),
                pose,
            });
            for collision in &link.collisions {
                if self.add_surface(0, pose, collision, None) {
                    summary.surfaces += 1;
                } else {
                    summary.skipped_shapes += 1;
                }
            }
        }
        log::debug!(
            "static model {}: {} links grounded, {} surfaces",
            model.name,
            model.links().len(),
            summary.surfaces
        );
        summary
    }

    /// Instantiates the mobilizers, surfaces and welds of a dynamic model.
    pub fn add_model(&mut self, id: ModelId, model: &Model, graph: &MultibodyGraph) -> ModelSummary {
        let mut summary = ModelSummary::default();
        let clique = self.system.num_cliques;
        self.system.num_cliques += 1;
        let mut slave_bodies = HashMap::new();

        for mob in &graph.mobilizers {
            let parent = match mob.inboard {
                None => 0,
                Some(link) => match self.system.masters.get(&(id, link)) {
                    Some(&index) => index,
                    None => {
                        log::warn!(
                            "model {}: inboard link {} not built before its children",
                            model.name,
                            link.0
                        );
                        continue;
                    }
                },
            };
            let Some(frames) = Self::frames_for(model, mob) else {
                continue;
            };
            let joint = mob.joint().and_then(|j| model.joint(j));

            let role = match mob.slave {
                Some(slave) => BodyRole::Slave {
                    model: id,
                    link: mob.outboard,
                    slave,
                },
                None => BodyRole::Master {
                    model: id,
                    link: mob.outboard,
                },
            };
            let mass = match mob.slave {
                Some(slave) => graph.slaves[slave.0].mass,
                None => graph.master_mass[mob.outboard.0],
            };

            let index = self.system.bodies.len();
            self.system.bodies.push(BackendBody {
                role,
                parent,
                kind: frames.kind,
                x_pf: frames.x_pf,
                x_bm: frames.x_bm,
                q_offset: self.system.nq,
                u_offset: self.system.nu,
                mass,
                damping: joint.map_or(0.0, |j| j.damping),
                joint: mob.joint(),
                reversed: mob.reversed,
                default_q: frames.default_q,
            });
            self.system.nq += frames.kind.nq();
            self.system.nu += frames.kind.nu();
            summary.mobilizers += 1;

            if let Some(j) = mob.joint() {
                self.system.joints.insert((id, j), index);
            }
            match mob.slave {
                Some(slave) => {
                    slave_bodies.insert(slave, index);
                    summary.slaves += 1;
                }
                None => {
                    self.system.masters.insert((id, mob.outboard), index);
                    let Some(link) = model.link(mob.outboard) else {
                        continue;
                    };
                    let link_clique = (!link.self_collide).then_some(clique);
                    for collision in &link.collisions {
                        if self.add_surface(index, Transform::IDENTITY, collision, link_clique) {
                            summary.surfaces += 1;
                        } else {
                            summary.skipped_shapes += 1;
                        }
                    }
                }
            }
        }

        for constraint in &graph.loops {
            let master = self.system.masters.get(&(id, constraint.master)).copied();
            let slave = slave_bodies.get(&constraint.slave).copied();
            if let (Some(master), Some(slave)) = (master, slave) {
                self.system.welds.push(Weld { master, slave });
                summary.welds += 1;
            }
        }

        log::debug!(
            "model {}: {} mobilizers ({} slaves), {} welds, {} surfaces",
            model.name,
            summary.mobilizers,
            summary.slaves,
            summary.welds,
            summary.surfaces
        );
        summary
    }

    /// Completes the system, caching the contact pairs.
    pub fn finish(mut self) -> MultibodySystem {
        self.system.contact_pairs = contact_pairs(&self.system.surfaces);
        self.system
    }

    fn frames_for(model: &Model, mob: &GraphMobilizer) -> Option<JointFrames> {
        match mob.source {
            MobilizerSource::AddedFree => {
                let kind = MobilizerKind::Free;
                let pose = model.default_world_pose(mob.outboard)?;
                Some(JointFrames {
                    kind,
                    x_pf: Transform::IDENTITY,
                    x_bm: Transform::IDENTITY,
                    default_q: kind.coordinates_for(&pose),
                })
            }
            MobilizerSource::AddedWeld => Some(JointFrames {
                kind: MobilizerKind::Weld,
                x_pf: model.default_world_pose(mob.outboard)?,
                x_bm: Transform::IDENTITY,
                default_q: Vec::new(),
            }),
            MobilizerSource::Joint(id) => {
                let joint = model.joint(id)?;
                let Some(kind) = MobilizerKind::for_joint(joint.joint_type, joint.thread_pitch) else {
                    log::warn!(
                        "model {}: joint {} of type [{}] has no mobilizer, skipping",
                        model.name,
                        joint.name,
                        joint.joint_type
                    );
                    return None;
                };
                Self::joint_frames(model, joint, kind, mob.reversed)
            }
        }
    }

    /// Places F on the inboard body and M on the outboard body so that both
    /// coincide with the joint frame at rest, rotated to the kind's canonical axes.
    fn joint_frames(model: &Model, joint: &Joint, kind: MobilizerKind, reversed: bool) -> Option<JointFrames> {
        let child = model.link_id(&joint.child)?;
        let child_world = model.default_world_pose(child)?;
        let parent_world = match joint.parent.as_deref() {
            None | Some(super::graph::WORLD_BODY) => Transform::IDENTITY,
            Some(name) => model.default_world_pose(model.link_id(name)?)?,
        };
        let joint_world = child_world * joint.pose;
        let joint_in_parent = parent_world.inverse() * joint_world;
        let joint_in_child = joint.pose;

        let align = Transform::from_rotation(Self::alignment(kind, joint, reversed));
        let offset = if reversed {
            joint.initial_offset.inverse()
        } else {
            joint.initial_offset
        };
        let default_fm = align.inverse() * offset * align;

        let (x_pf, x_bm) = if reversed {
            (joint_in_child * align, joint_in_parent * align)
        } else {
            (joint_in_parent * align, joint_in_child * align)
        };

        Some(JointFrames {
            kind,
            x_pf,
            x_bm,
            default_q: kind.coordinates_for(&default_fm),
        })
    }

    fn alignment(kind: MobilizerKind, joint: &Joint, reversed: bool) -> DQuat {
        match kind {
            MobilizerKind::Pin | MobilizerKind::Slider | MobilizerKind::Screw { .. } => {
                rotation_aligning(kind.canonical_axis(), joint.axis)
            }
            MobilizerKind::Universal if reversed => frame_from_axes(joint.axis2, joint.axis),
            MobilizerKind::Universal => frame_from_axes(joint.axis, joint.axis2),
            MobilizerKind::Free | MobilizerKind::Ball | MobilizerKind::Weld => DQuat::IDENTITY,
        }
    }

    /// Maps a collision shape to backend geometry and attaches it to `body`.
    ///
    /// `base` is the pose of the link frame in the body frame.
    fn add_surface(&mut self, body: usize, base: Transform, collision: &Collision, clique: Option<usize>) -> bool {
        let mut pose = base * collision.pose;
        let geometry = match &collision.shape {
            Shape::Plane { normal } => {
                pose = pose * Transform::from_rotation(rotation_aligning(DVec3::Z, *normal));
                ContactGeometry::HalfSpace
            }
            Shape::Sphere { radius } => ContactGeometry::Sphere { radius: *radius },
            Shape::Box { size } => ContactGeometry::Ellipsoid { radii: *size * 0.5 },
            Shape::Cylinder { radius, length } => ContactGeometry::Ellipsoid {
                radii: DVec3::new(*radius, *radius, 0.5 * length),
            },
            Shape::Heightmap {
                rows,
                cols,
                size,
                heights,
            } => ContactGeometry::Heightmap {
                rows: *rows,
                cols: *cols,
                size: *size,
                heights: heights.clone(),
            },
            Shape::Mesh {
                vertices,
                triangles,
            } => ContactGeometry::TriangleMesh {
                vertices: vertices.clone(),
                triangles: triangles.clone(),
            },
            Shape::Ray { .. } => {
                log::warn!(
                    "collision {}: shape type [{}] has no contact geometry, skipping",
                    collision.name,
                    collision.shape.shape_type()
                );
                return false;
            }
        };
        self.system.surfaces.push(ContactSurface {
            name: collision.name.clone(),
            body,
            pose,
            geometry,
            material: collision.material,
            clique,
        });
        true
    }
}

/// Builds the system for a set of models, static ones included (`graph = None`).
pub fn build_system<'a>(
    gravity: DVec3,
    transition_velocity: f64,
    weld_stabilization: f64,
    models: impl IntoIterator<Item = (ModelId, &'a Model, Option<&'a MultibodyGraph>)>,
) -> MultibodySystem {
    let mut builder = SystemBuilder::new(gravity, transition_velocity, weld_stabilization);
    for (id, model, graph) in models {
        match graph {
            Some(graph) => builder.add_model(id, model, graph),
            None => builder.add_static_model(id, model),
        };
    }
    builder.finish()
}
