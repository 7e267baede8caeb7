use serde::{Deserialize, Serialize};

use super::shape::Collision;
use super::types::{MassProperties, Transform};

/// Index of a link within its owning model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub usize);

/// Rigid body of an articulated model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub mass: MassProperties,
    /// Rest pose relative to the model frame.
    pub pose: Transform,
    pub collisions: Vec<Collision>,
    pub self_collide: bool,
    pub is_static: bool,
    /// Forces the graph builder to give this link its own free base mobilizer.
    pub must_be_base: bool,
    /// Last pose published by the physics engine, in world coordinates.
    pub world_pose: Transform,
}

impl Link {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mass: MassProperties::default(),
            pose: Transform::IDENTITY,
            collisions: Vec::new(),
            self_collide: false,
            is_static: false,
            must_be_base: false,
            world_pose: Transform::IDENTITY,
        }
    }

    pub fn with_mass(mut self, mass: MassProperties) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_pose(mut self, pose: Transform) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_collision(mut self, collision: Collision) -> Self {
        self.collisions.push(collision);
        self
    }

    pub fn with_self_collide(mut self, enabled: bool) -> Self {
        self.self_collide = enabled;
        self
    }

    pub fn with_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    pub fn with_must_be_base(mut self, must_be_base: bool) -> Self {
        self.must_be_base = must_be_base;
        self
    }

    pub fn add_collision(&mut self, collision: Collision) {
        self.collisions.push(collision);
    }
}
