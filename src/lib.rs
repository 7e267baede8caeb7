//! mobod – multibody dynamics adapter for articulated models.
//!
//! Takes a backend-agnostic model description (links, joints, collision
//! shapes) and maps it onto a reduced-coordinate rigid-body solver: the link
//! graph is cut into a spanning tree plus welded loop closures, each joint
//! becomes a typed mobilizer, collision shapes become compliant contact
//! surfaces, and an adaptive integrator advances the system while stepped
//! poses are published to a lock-free-for-readers pose queue.

pub mod config;
pub mod core;
pub mod dynamics;
pub mod engine;
pub mod error;
pub mod utils;
pub mod world;

pub use glam::{DMat3, DQuat, DVec3};

pub use config::EngineConfig;
pub use crate::core::{
    Collision, ContactMaterial, Joint, JointId, JointType, Link, LinkId, MassProperties, Model, Shape,
    ShapeType, Transform,
};
pub use dynamics::{
    LinkHandle, MobilizerKind, MultibodyGraph, MultibodySystem, PoseQueue, PoseUpdate,
};
pub use engine::{
    create_engine, EngineContext, Gravity, MultibodyEngine, PhysicsEngine, PhysicsLock, MULTIBODY_ENGINE,
};
pub use error::{PhysicsError, SolverError, TopologyError, UnsupportedElementError};
pub use utils::{Arena, ModelId};
pub use world::World;
