//! Backend-agnostic description of articulated bodies: links, joints, shapes, and models.

pub mod joint;
pub mod link;
pub mod model;
pub mod shape;
pub mod types;

pub use joint::{Joint, JointId, JointType};
pub use link::{Link, LinkId};
pub use model::Model;
pub use shape::{Collision, Shape, ShapeType};
pub use types::{ContactMaterial, MassProperties, Transform};
