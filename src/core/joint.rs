use std::fmt;
use std::str::FromStr;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::types::Transform;
use crate::error::UnsupportedElementError;

/// Index of a joint within its owning model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JointId(pub usize);

/// Joint type tag of the generic model description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    Free,
    Revolute,
    Prismatic,
    Universal,
    Ball,
    Screw,
    /// Two-axis hinge; describable by loaders but not mobilized by this backend.
    Revolute2,
}

impl JointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JointType::Free => "free",
            JointType::Revolute => "revolute",
            JointType::Prismatic => "prismatic",
            JointType::Universal => "universal",
            JointType::Ball => "ball",
            JointType::Screw => "screw",
            JointType::Revolute2 => "revolute2",
        }
    }

    /// Mobilities the joint leaves free, or `None` if the backend cannot build it.
    pub fn dofs(&self) -> Option<usize> {
        match self {
            JointType::Free => Some(6),
            JointType::Revolute | JointType::Prismatic | JointType::Screw => Some(1),
            JointType::Universal => Some(2),
            JointType::Ball => Some(3),
            JointType::Revolute2 => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.dofs().is_some()
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JointType {
    type Err = UnsupportedElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(JointType::Free),
            "revolute" => Ok(JointType::Revolute),
            "prismatic" => Ok(JointType::Prismatic),
            "universal" => Ok(JointType::Universal),
            "ball" => Ok(JointType::Ball),
            "screw" => Ok(JointType::Screw),
            "revolute2" => Ok(JointType::Revolute2),
            other => Err(UnsupportedElementError::JointType(other.to_string())),
        }
    }
}

/// Connection between two links of a model.
///
/// `parent` and `child` are link names resolved against the owning model when
/// the multibody graph is built; a missing parent attaches the joint to the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub joint_type: JointType,
    pub parent: Option<String>,
    pub child: String,
    /// Joint frame expressed in the child link frame.
    pub pose: Transform,
    /// Primary axis in the joint frame.
    pub axis: DVec3,
    /// Second axis of a universal joint, in the joint frame.
    pub axis2: DVec3,
    /// Translation per radian of a screw joint (m/rad).
    pub thread_pitch: f64,
    /// Viscous damping applied to every mobility of the joint.
    pub damping: f64,
    /// Prefer cutting this joint when it closes a kinematic loop.
    pub must_break_loop: bool,
    /// Default pose of the child joint frame relative to the parent joint frame.
    pub initial_offset: Transform,
}

impl Joint {
    pub fn new(
        name: impl Into<String>,
        joint_type: JointType,
        parent: Option<&str>,
        child: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            joint_type,
            parent: parent.map(str::to_string),
            child: child.into(),
            pose: Transform::IDENTITY,
            axis: DVec3::Z,
            axis2: DVec3::Y,
            thread_pitch: 0.0,
            damping: 0.0,
            must_break_loop: false,
            initial_offset: Transform::IDENTITY,
        }
    }

    pub fn with_axis(mut self, axis: DVec3) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_axis2(mut self, axis2: DVec3) -> Self {
        self.axis2 = axis2;
        self
    }

    pub fn with_pose(mut self, pose: Transform) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_thread_pitch(mut self, pitch: f64) -> Self {
        self.thread_pitch = pitch;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    pub fn with_initial_offset(mut self, offset: Transform) -> Self {
        self.initial_offset = offset;
        self
    }

    pub fn breaking_loop(mut self) -> Self {
        self.must_break_loop = true;
        self
    }
}
