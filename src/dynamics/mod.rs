//! Multibody solver: graph extraction, system assembly, forward dynamics, integration, and pose sync.

pub mod builder;
pub mod contact;
pub mod forward;
pub mod graph;
pub mod integrator;
pub mod mobilizer;
pub mod state;
pub mod sync;
pub mod system;

pub use builder::{build_system, ModelSummary, SystemBuilder};
pub use contact::{ContactGeometry, ContactModel, ContactPoint, ContactSurface};
pub use forward::LoadedSystem;
pub use graph::{GraphMobilizer, LoopConstraint, MobilizerSource, MultibodyGraph, SlaveBody, SlaveId, WORLD_BODY};
pub use integrator::{Dynamics, Integrator, IntegratorStats};
pub use mobilizer::{Attachment, AxisMotion, HingeAxis, MobilizerKind};
pub use state::{Kinematics, State, StateDerivative};
pub use sync::{LinkHandle, PoseQueue, PoseUpdate};
pub use system::{AppliedLoads, BackendBody, BodyRole, MobilizerKey, MultibodySystem, Weld};
