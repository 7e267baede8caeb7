//! Spanning-tree extraction for articulated models.
//!
//! A model's links and joints form a graph that may contain cycles. The
//! builder grows a tree of mobilizers out from the world, synthesizes base
//! mobilizers for parts of the model that do not reach the world through a
//! joint, and cuts every joint that would close a loop by mobilizing a slave
//! copy of its child link instead. Slaves are later welded to their masters.
//!
//! Joints are swept in registration order, so the joint that ends up cut is
//! always the first one (in input order) found to close a cycle once the tree
//! has grown around it. Rebuilding an unchanged model yields the same graph.

use std::fmt;

use crate::core::{JointId, JointType, LinkId, MassProperties, Model};
use crate::error::TopologyError;

/// Name the world body is registered under; joints may use it as parent.
pub const WORLD_BODY: &str = "world";

/// Where a mobilizer comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MobilizerSource {
    /// Free base mobilizer synthesized for a link not reachable through joints.
    AddedFree,
    /// Rigid base mobilizer fixing a static link of a dynamic model to the world.
    AddedWeld,
    /// Mobilizer realizing one of the model's joints.
    Joint(JointId),
}

/// Index of a slave body within [`MultibodyGraph::slaves`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlaveId(pub usize);

/// One edge of the spanning tree.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphMobilizer {
    pub source: MobilizerSource,
    pub joint_type: JointType,
    /// Inboard body; `None` is the world. Always a master body.
    pub inboard: Option<LinkId>,
    /// Link whose master (or slave, see `slave`) body this mobilizer moves.
    pub outboard: LinkId,
    pub slave: Option<SlaveId>,
    /// Joint traversed child-to-parent.
    pub reversed: bool,
    /// Distance from the world in the tree.
    pub level: usize,
}

impl GraphMobilizer {
    pub fn is_added_base(&self) -> bool {
        !matches!(self.source, MobilizerSource::Joint(_))
    }

    pub fn is_slave(&self) -> bool {
        self.slave.is_some()
    }

    /// Short name of the motion this mobilizer permits.
    pub fn kind_name(&self) -> &'static str {
        match self.source {
            MobilizerSource::AddedWeld => "weld",
            MobilizerSource::AddedFree | MobilizerSource::Joint(_) => self.joint_type.as_str(),
        }
    }

    pub fn joint(&self) -> Option<JointId> {
        match self.source {
            MobilizerSource::Joint(id) => Some(id),
            MobilizerSource::AddedFree | MobilizerSource::AddedWeld => None,
        }
    }
}

/// Duplicate body created to cut a loop.
#[derive(Debug, Clone, PartialEq)]
pub struct SlaveBody {
    pub master: LinkId,
    pub mass: MassProperties,
}

/// A joint that closed a cycle and is realized through a slave body and a weld.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConstraint {
    pub joint: JointId,
    pub master: LinkId,
    pub slave: SlaveId,
}

/// Acyclic mobilizer tree plus loop constraints derived from one model.
#[derive(Debug, Clone, PartialEq)]
pub struct MultibodyGraph {
    pub model_name: String,
    /// Mobilizers in topological order: every inboard body precedes its outboard bodies.
    pub mobilizers: Vec<GraphMobilizer>,
    pub slaves: Vec<SlaveBody>,
    pub loops: Vec<LoopConstraint>,
    /// Number of bodies (master plus slaves) representing each link.
    pub fragments: Vec<usize>,
    /// Mass share carried by each link's master body.
    pub master_mass: Vec<MassProperties>,
    /// Joints left out because the backend cannot mobilize their type.
    pub skipped_joints: Vec<JointId>,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    joint: JointId,
    joint_type: JointType,
    parent: Option<LinkId>,
    child: LinkId,
    must_break: bool,
}

struct TreeGrowth {
    in_tree: Vec<bool>,
    level: Vec<usize>,
    mobilizers: Vec<GraphMobilizer>,
}

impl TreeGrowth {
    fn attach_base(&mut self, link: LinkId, source: MobilizerSource) {
        let joint_type = JointType::Free;
        self.mobilizers.push(GraphMobilizer {
            source,
            joint_type,
            inboard: None,
            outboard: link,
            slave: None,
            reversed: false,
            level: 1,
        });
        self.in_tree[link.0] = true;
        self.level[link.0] = 1;
    }

    fn inboard_level(&self, inboard: Option<LinkId>) -> usize {
        inboard.map_or(0, |l| self.level[l.0])
    }

    fn attach(&mut self, edge: &Edge, reversed: bool) {
        let (inboard, outboard) = if reversed {
            // Parent is the unattached end; it exists because the world is always in the tree.
            match edge.parent {
                Some(parent) => (Some(edge.child), parent),
                None => return,
            }
        } else {
            (edge.parent, edge.child)
        };
        let level = self.inboard_level(inboard) + 1;
        self.mobilizers.push(GraphMobilizer {
            source: MobilizerSource::Joint(edge.joint),
            joint_type: edge.joint_type,
            inboard,
            outboard,
            slave: None,
            reversed,
            level,
        });
        self.in_tree[outboard.0] = true;
        self.level[outboard.0] = level;
    }

    /// Sweeps `edges` in order until no joint extends the tree.
    fn grow(&mut self, edges: &[Edge], used: &mut [bool]) {
        loop {
            let mut progressed = false;
            for (k, edge) in edges.iter().enumerate() {
                if used[k] || edge.must_break {
                    continue;
                }
                let parent_in = edge.parent.map_or(true, |p| self.in_tree[p.0]);
                let child_in = self.in_tree[edge.child.0];
                match (parent_in, child_in) {
                    (true, false) => self.attach(edge, false),
                    (false, true) => self.attach(edge, true),
                    _ => continue,
                }
                used[k] = true;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }
}

impl MultibodyGraph {
    /// Builds the spanning tree and loop list of a non-static model.
    pub fn build(model: &Model) -> Result<Self, TopologyError> {
        if model.is_static {
            return Err(TopologyError::StaticModel {
                model: model.name.clone(),
            });
        }
        let links = model.links();
        if links.is_empty() {
            return Err(TopologyError::EmptyModel {
                model: model.name.clone(),
            });
        }

        let (edges, skipped_joints) = Self::resolve_joints(model)?;

        let mut growth = TreeGrowth {
            in_tree: vec![false; links.len()],
            level: vec![0; links.len()],
            mobilizers: Vec::with_capacity(links.len() + edges.len()),
        };

        for (i, link) in links.iter().enumerate() {
            if link.is_static {
                growth.attach_base(LinkId(i), MobilizerSource::AddedWeld);
            }
        }
        for (i, link) in links.iter().enumerate() {
            if link.must_be_base && !growth.in_tree[i] {
                growth.attach_base(LinkId(i), MobilizerSource::AddedFree);
            }
        }

        let mut used = vec![false; edges.len()];
        loop {
            growth.grow(&edges, &mut used);
            let unattached: Vec<usize> = (0..links.len()).filter(|&i| !growth.in_tree[i]).collect();
            if unattached.is_empty() {
                break;
            }
            let base = Self::choose_base(model, &edges, &unattached).ok_or_else(|| {
                TopologyError::NoBaseLink {
                    model: model.name.clone(),
                    links: unattached.iter().map(|&i| links[i].name.clone()).collect(),
                }
            })?;
            log::debug!(
                "model {}: link {} becomes a free base",
                model.name,
                links[base.0].name
            );
            growth.attach_base(base, MobilizerSource::AddedFree);
        }

        let mut slaves = Vec::new();
        let mut loops = Vec::new();
        for (k, edge) in edges.iter().enumerate() {
            if used[k] {
                continue;
            }
            let slave = SlaveId(slaves.len());
            slaves.push(SlaveBody {
                master: edge.child,
                mass: MassProperties::default(),
            });
            let level = growth.inboard_level(edge.parent) + 1;
            growth.mobilizers.push(GraphMobilizer {
                source: MobilizerSource::Joint(edge.joint),
                joint_type: edge.joint_type,
                inboard: edge.parent,
                outboard: edge.child,
                slave: Some(slave),
                reversed: false,
                level,
            });
            loops.push(LoopConstraint {
                joint: edge.joint,
                master: edge.child,
                slave,
            });
        }

        let mut fragments = vec![1usize; links.len()];
        for slave in &slaves {
            fragments[slave.master.0] += 1;
        }
        for slave in &mut slaves {
            slave.mass = links[slave.master.0].mass.split(fragments[slave.master.0]);
        }
        let master_mass = links
            .iter()
            .zip(&fragments)
            .map(|(link, &n)| link.mass.split(n))
            .collect();

        let graph = MultibodyGraph {
            model_name: model.name.clone(),
            mobilizers: growth.mobilizers,
            slaves,
            loops,
            fragments,
            master_mass,
            skipped_joints,
        };
        log::debug!("{graph}");
        Ok(graph)
    }

    fn resolve_joints(model: &Model) -> Result<(Vec<Edge>, Vec<JointId>), TopologyError> {
        let resolve = |joint: &str, name: &str| {
            model
                .link_id(name)
                .ok_or_else(|| TopologyError::UnknownLink {
                    joint: joint.to_string(),
                    link: name.to_string(),
                })
        };

        let mut edges = Vec::with_capacity(model.joints().len());
        let mut skipped = Vec::new();
        for (i, joint) in model.joints().iter().enumerate() {
            let child = resolve(&joint.name, &joint.child)?;
            let parent = match joint.parent.as_deref() {
                None | Some(WORLD_BODY) => None,
                Some(name) => Some(resolve(&joint.name, name)?),
            };
            if parent == Some(child) {
                return Err(TopologyError::SelfJoint {
                    joint: joint.name.clone(),
                    link: joint.child.clone(),
                });
            }
            if !joint.joint_type.is_supported() {
                log::warn!(
                    "model {}: joint {} of type [{}] is not supported, skipping",
                    model.name,
                    joint.name,
                    joint.joint_type
                );
                skipped.push(JointId(i));
                continue;
            }
            edges.push(Edge {
                joint: JointId(i),
                joint_type: joint.joint_type,
                parent,
                child,
                must_break: joint.must_break_loop,
            });
        }
        Ok((edges, skipped))
    }

    /// Picks the link that anchors a disconnected part of the model.
    ///
    /// Links that are never a joint child come first, then heavier links;
    /// remaining ties keep link order. Massless links cannot float freely.
    fn choose_base(model: &Model, edges: &[Edge], unattached: &[usize]) -> Option<LinkId> {
        let links = model.links();
        let is_child = |i: usize| edges.iter().any(|e| e.child.0 == i);
        let mut best: Option<(usize, bool, f64)> = None;
        for &i in unattached {
            let mass = links[i].mass.mass;
            if mass.is_nan() || mass <= 0.0 {
                continue;
            }
            let root = !is_child(i);
            let better = match best {
                None => true,
                Some((_, best_root, best_mass)) => {
                    (root && !best_root) || (root == best_root && mass > best_mass)
                }
            };
            if better {
                best = Some((i, root, mass));
            }
        }
        best.map(|(i, _, _)| LinkId(i))
    }

    pub fn num_mobilizers(&self) -> usize {
        self.mobilizers.len()
    }

    pub fn num_masters(&self) -> usize {
        self.mobilizers.iter().filter(|m| !m.is_slave()).count()
    }

    pub fn num_slaves(&self) -> usize {
        self.slaves.len()
    }

    /// Mobilizer moving the master body of `link`.
    pub fn master_mobilizer(&self, link: LinkId) -> Option<&GraphMobilizer> {
        self.mobilizers
            .iter()
            .find(|m| m.outboard == link && !m.is_slave())
    }
}

impl fmt::Display for MultibodyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "multibody graph of {}: {} mobilizers, {} slaves, {} loops",
            self.model_name,
            self.mobilizers.len(),
            self.slaves.len(),
            self.loops.len()
        )?;
        for (i, mob) in self.mobilizers.iter().enumerate() {
            let inboard = mob
                .inboard
                .map_or_else(|| WORLD_BODY.to_string(), |l| format!("link {}", l.0));
            let outboard = match mob.slave {
                Some(slave) => format!("slave {} of link {}", slave.0, mob.outboard.0),
                None => format!("link {}", mob.outboard.0),
            };
            let origin = match mob.source {
                MobilizerSource::AddedFree => "added free".to_string(),
                MobilizerSource::AddedWeld => "added weld".to_string(),
                MobilizerSource::Joint(j) => format!("joint {}", j.0),
            };
            writeln!(
                f,
                "  [{i}] level {} {inboard} -> {outboard} ({}, {origin}{})",
                mob.level,
                mob.kind_name(),
                if mob.reversed { ", reversed" } else { "" }
            )?;
        }
        Ok(())
    }
}
