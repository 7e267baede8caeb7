//! Error taxonomy of the multibody adapter.

use thiserror::Error;

use crate::utils::allocator::ModelId;

/// Structural problems that make a model impossible to build. Fatal to the model load.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TopologyError {
    /// The model has no links at all.
    #[error("model {model} has no links")]
    EmptyModel {
        /// Name of the model.
        model: String,
    },

    /// Static models are attached to ground directly and have no graph.
    #[error("model {model} is static and has no multibody graph")]
    StaticModel {
        /// Name of the model.
        model: String,
    },

    /// A joint names a parent or child link that does not exist.
    #[error("joint {joint} references unknown link {link}")]
    UnknownLink {
        /// The joint holding the reference.
        joint: String,
        /// The unresolved link name.
        link: String,
    },

    /// A joint connects a link to itself.
    #[error("joint {joint} connects link {link} to itself")]
    SelfJoint {
        /// The joint.
        joint: String,
        /// The link on both ends.
        link: String,
    },

    /// A disconnected part of the model has no link able to act as a base.
    #[error("model {model} has no resolvable base link for {links:?}")]
    NoBaseLink {
        /// Name of the model.
        model: String,
        /// Links left unattached.
        links: Vec<String>,
    },
}

/// Elements the backend cannot represent. Non-fatal: the element is skipped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UnsupportedElementError {
    /// Unknown or unsupported joint type.
    #[error("unable to create joint of type [{0}]")]
    JointType(String),

    /// Unknown or unsupported collision shape type.
    #[error("unable to create collision of type [{0}]")]
    ShapeType(String),
}

/// Failures raised while advancing the numerical state. Fatal to the step.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// Mass or constraint matrix could not be factorized.
    #[error("singular system matrix at t = {time}")]
    SingularMassMatrix {
        /// Solver time of the failure.
        time: f64,
    },

    /// Required accuracy could not be met with the smallest admissible step.
    #[error("step size {step} fell below minimum {min} at t = {time}")]
    StepSizeUnderflow {
        /// Rejected step size.
        step: f64,
        /// Configured minimum.
        min: f64,
        /// Solver time of the failure.
        time: f64,
    },

    /// Too many internal steps in one outer step.
    #[error("exceeded {limit} internal steps while stepping to t = {target}")]
    TooManySteps {
        /// Configured limit.
        limit: u32,
        /// Target time of the outer step.
        target: f64,
    },

    /// State became NaN or infinite.
    #[error("simulation diverged at t = {time}: {reason}")]
    Diverged {
        /// Solver time of the failure.
        time: f64,
        /// What went non-finite.
        reason: String,
    },
}

/// Umbrella error returned by the engine and world surfaces.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedElementError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// No engine registered under the requested name.
    #[error("unknown physics engine: {0}")]
    UnknownEngine(String),

    /// Model handle does not refer to a live model.
    #[error("unknown model: {0}")]
    UnknownModel(ModelId),

    /// Operation requires `init` to have run.
    #[error("physics engine used before init")]
    NotInitialized,
}
