use serde::{Deserialize, Serialize};

use super::joint::{Joint, JointId};
use super::link::{Link, LinkId};
use super::types::Transform;

/// Articulated body description: ordered links and joints.
///
/// The model exclusively owns its links; joints only refer to them by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    /// Model frame in world coordinates.
    pub pose: Transform,
    /// Every link of a static model is fixed to the ground.
    pub is_static: bool,
    links: Vec<Link>,
    joints: Vec<Joint>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pose: Transform::IDENTITY,
            is_static: false,
            links: Vec::new(),
            joints: Vec::new(),
        }
    }

    pub fn with_pose(mut self, pose: Transform) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn add_link(&mut self, mut link: Link) -> LinkId {
        link.world_pose = self.pose * link.pose;
        self.links.push(link);
        LinkId(self.links.len() - 1)
    }

    pub fn add_joint(&mut self, joint: Joint) -> JointId {
        self.joints.push(joint);
        JointId(self.joints.len() - 1)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub fn link_mut(&mut self, id: LinkId) -> Option<&mut Link> {
        self.links.get_mut(id.0)
    }

    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id.0)
    }

    pub fn link_id(&self, name: &str) -> Option<LinkId> {
        self.links.iter().position(|l| l.name == name).map(LinkId)
    }

    pub fn joint_id(&self, name: &str) -> Option<JointId> {
        self.joints.iter().position(|j| j.name == name).map(JointId)
    }

    /// Default world pose of a link, from the model and link rest poses.
    pub fn default_world_pose(&self, id: LinkId) -> Option<Transform> {
        self.link(id).map(|link| self.pose * link.pose)
    }

    /// Resets every link's published pose to its rest pose.
    pub fn reset_poses(&mut self) {
        let pose = self.pose;
        for link in &mut self.links {
            link.world_pose = pose * link.pose;
        }
    }
}
