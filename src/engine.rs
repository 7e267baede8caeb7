//! Physics engine contract and the multibody backend behind it.

use std::str::FromStr;
use std::sync::Arc;

use glam::DVec3;
use nalgebra::DVector;
use parking_lot::ReentrantMutex;

use crate::config::EngineConfig;
use crate::core::{Collision, Joint, JointId, JointType, Link, LinkId, Model, ShapeType};
use crate::dynamics::forward::LoadedSystem;
use crate::dynamics::system::StateSnapshot;
use crate::dynamics::{
    build_system, sync, AppliedLoads, Integrator, Kinematics, MultibodyGraph, MultibodySystem, PoseQueue, State,
};
use crate::error::{PhysicsError, UnsupportedElementError};
use crate::utils::{Arena, ModelId, ScopedTimer, SpatialVec, StepProfile};

/// Process-wide recursive lock serializing topology changes with stepping.
pub type PhysicsLock = Arc<ReentrantMutex<()>>;

/// Handles an engine shares with the simulation that owns it.
#[derive(Debug, Clone, Default)]
pub struct EngineContext {
    pub physics_lock: PhysicsLock,
    pub poses: PoseQueue,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Gravity as a unit direction and a magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub direction: DVec3,
    pub magnitude: f64,
}

impl Default for Gravity {
    fn default() -> Self {
        Self {
            direction: DVec3::NEG_Z,
            magnitude: 0.0,
        }
    }
}

impl Gravity {
    /// Updates from a vector; the zero vector clears the magnitude and keeps the direction.
    pub fn set(&mut self, gravity: DVec3) {
        let magnitude = gravity.length();
        if magnitude == 0.0 {
            self.magnitude = 0.0;
            return;
        }
        self.direction = gravity / magnitude;
        self.magnitude = magnitude;
    }

    pub fn vector(&self) -> DVec3 {
        self.direction * self.magnitude
    }
}

/// Capability contract of a dynamics backend.
///
/// Every call that changes topology or advances time takes the context's
/// physics lock for its whole duration.
pub trait PhysicsEngine: Send {
    fn name(&self) -> &str;

    fn load(&mut self, config: &EngineConfig) -> Result<(), PhysicsError>;

    fn init(&mut self) -> Result<(), PhysicsError>;

    /// Registers a model. Construction errors surface here, synchronously.
    fn init_model(&mut self, id: ModelId, model: &Model) -> Result<(), PhysicsError>;

    /// Forgets a model; the survivors in `models` keep their current state.
    fn remove_model(&mut self, id: ModelId, models: &Arena<Model>) -> Result<(), PhysicsError>;

    /// Rebuilds every model in its default configuration at time zero.
    fn reset(&mut self, models: &Arena<Model>) -> Result<(), PhysicsError>;

    /// Steps to `target_time` and writes the resulting poses back into `models`.
    fn update_physics(&mut self, models: &mut Arena<Model>, target_time: f64) -> Result<(), PhysicsError>;

    fn fini(&mut self);

    fn create_link(&self, model: &Model, name: &str) -> Link;

    fn create_joint(&self, joint_type: &str, model: &Model) -> Result<Joint, UnsupportedElementError>;

    fn create_collision(&self, shape_type: &str, link: &Link) -> Result<Collision, UnsupportedElementError>;

    fn set_gravity(&mut self, gravity: DVec3);

    fn gravity(&self) -> Gravity;

    fn set_step_time(&mut self, step_time: f64);

    fn step_time(&self) -> f64;

    fn time(&self) -> f64;

    /// One-shot force at a world point, cleared after the next update.
    fn apply_link_force(&mut self, model: ModelId, link: LinkId, force: DVec3, point: DVec3) -> Result<bool, PhysicsError>;

    /// One-shot torque in world axes, cleared after the next update.
    fn apply_link_torque(&mut self, model: ModelId, link: LinkId, torque: DVec3) -> Result<bool, PhysicsError>;

    /// One-shot generalized force on a joint axis, cleared after the next update.
    fn apply_joint_force(&mut self, model: ModelId, joint: JointId, axis: usize, force: f64) -> Result<bool, PhysicsError>;

    /// Joint coordinate in the joint's own sign convention.
    fn joint_position(&self, model: ModelId, joint: JointId, axis: usize) -> Option<f64>;
}

/// Name the multibody backend is registered under.
pub const MULTIBODY_ENGINE: &str = "multibody";

/// Creates the engine registered under `name`.
pub fn create_engine(name: &str, context: EngineContext) -> Result<Box<dyn PhysicsEngine>, PhysicsError> {
    match name {
        MULTIBODY_ENGINE => Ok(Box::new(MultibodyEngine::new(context))),
        other => Err(PhysicsError::UnknownEngine(other.to_string())),
    }
}

/// A model as the engine last saw it, with its graph (`None` for static models).
#[derive(Debug, Clone)]
struct ModelEntry {
    id: ModelId,
    model: Model,
    graph: Option<MultibodyGraph>,
}

/// Reduced-coordinate multibody backend.
#[derive(Debug)]
pub struct MultibodyEngine {
    context: EngineContext,
    config: EngineConfig,
    gravity: Gravity,
    initialized: bool,
    entries: Vec<ModelEntry>,
    system: Option<MultibodySystem>,
    /// Topology changed since the system was last realized.
    dirty: bool,
    /// Discard state instead of carrying it into the next realization.
    discard_state: bool,
    state: State,
    loads: AppliedLoads,
    integrator: Integrator,
    profile: StepProfile,
}

impl MultibodyEngine {
    pub fn new(context: EngineContext) -> Self {
        let config = EngineConfig::default();
        let mut gravity = Gravity::default();
        gravity.set(DVec3::from_array(config.gravity));
        Self {
            integrator: Self::integrator_for(&config),
            context,
            config,
            gravity,
            initialized: false,
            entries: Vec::new(),
            system: None,
            dirty: false,
            discard_state: false,
            state: State::new(DVector::zeros(0), DVector::zeros(0)),
            loads: AppliedLoads::new(0, 0),
            profile: StepProfile::default(),
        }
    }

    fn integrator_for(config: &EngineConfig) -> Integrator {
        Integrator::new(
            config.accuracy,
            config.step_time,
            config.min_step_size,
            config.max_internal_steps,
        )
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The realized backend system, if any model has been stepped since the last change.
    pub fn system(&self) -> Option<&MultibodySystem> {
        self.system.as_ref()
    }

    pub fn graph(&self, id: ModelId) -> Option<&MultibodyGraph> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .and_then(|e| e.graph.as_ref())
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    /// One-shot loads pending for the next update.
    pub fn loads(&self) -> &AppliedLoads {
        &self.loads
    }

    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    fn graph_for(&mut self, model: &Model) -> Result<Option<MultibodyGraph>, PhysicsError> {
        if model.is_static {
            return Ok(None);
        }
        let _timer = ScopedTimer::recording("graph build", &mut self.profile.graph_build);
        Ok(Some(MultibodyGraph::build(model)?))
    }

    /// Re-reads surviving models from `models` and rebuilds their graphs.
    fn refresh_entries(&mut self, models: &Arena<Model>) -> Result<(), PhysicsError> {
        self.entries.retain(|e| models.contains(e.id));
        let mut changed = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if let Some(model) = models.get(entry.id) {
                if *model != entry.model {
                    changed.push((i, model));
                }
            }
        }
        let mut rebuilt = Vec::with_capacity(changed.len());
        for (i, model) in changed {
            rebuilt.push((i, model.clone(), self.graph_for(model)?));
        }
        for (i, model, graph) in rebuilt {
            self.entries[i].model = model;
            self.entries[i].graph = graph;
        }
        self.dirty = true;
        Ok(())
    }

    /// Builds the backend system if the topology changed.
    fn realize(&mut self) -> Result<(), PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        if !self.initialized {
            return Err(PhysicsError::NotInitialized);
        }
        if !self.dirty && self.system.is_some() {
            return Ok(());
        }

        let snapshot: Option<StateSnapshot> = match (&self.system, self.discard_state) {
            (Some(system), false) => Some(system.snapshot(&self.state)),
            _ => None,
        };
        let time = if self.discard_state { 0.0 } else { self.state.time };

        let system = {
            let _timer = ScopedTimer::recording("system build", &mut self.profile.system_build);
            build_system(
                self.gravity.vector(),
                self.config.transition_velocity,
                self.config.weld_stabilization,
                self.entries
                    .iter()
                    .map(|e| (e.id, &e.model, e.graph.as_ref())),
            )
        };

        let mut state = system.default_state();
        state.time = time;
        if let Some(snapshot) = snapshot {
            let restored = system.restore(&mut state, &snapshot);
            log::debug!("restored {restored} mobilizer states after rebuild");
        }
        log::debug!(
            "realized system: {} bodies, {} welds, {} surfaces, nq = {}, nu = {}",
            system.bodies.len(),
            system.welds.len(),
            system.surfaces.len(),
            system.nq(),
            system.nu()
        );

        self.loads = system.new_loads();
        self.state = state;
        self.system = Some(system);
        self.dirty = false;
        self.discard_state = false;
        Ok(())
    }

    fn master_body(&mut self, model: ModelId, link: LinkId) -> Result<Option<usize>, PhysicsError> {
        if !self.entries.iter().any(|e| e.id == model) {
            return Err(PhysicsError::UnknownModel(model));
        }
        self.realize()?;
        Ok(self.system.as_ref().and_then(|s| s.master_body(model, link)))
    }

    /// Joint speed in the joint's own sign convention.
    pub fn joint_velocity(&self, model: ModelId, joint: JointId, axis: usize) -> Option<f64> {
        let system = self.system.as_ref()?;
        let body = &system.bodies[system.joint_body(model, joint)?];
        let (index, sign) = body.joint_axis(axis)?;
        self.state.u.get(body.u_offset + index).map(|u| u * sign)
    }

    fn step(&mut self, models: &mut Arena<Model>, target_time: f64) -> Result<(), PhysicsError> {
        self.realize()?;
        let Some(system) = self.system.as_ref() else {
            return Err(PhysicsError::NotInitialized);
        };

        {
            let _timer = ScopedTimer::recording("integrate", &mut self.profile.integrate);
            let dynamics = LoadedSystem {
                system,
                loads: &self.loads,
            };
            let accepted_before = self.integrator.stats.accepted;
            let rejected_before = self.integrator.stats.rejected;
            self.integrator.step_to(&dynamics, &mut self.state, target_time)?;
            self.profile.internal_steps += self.integrator.stats.accepted - accepted_before;
            self.profile.rejected_steps += self.integrator.stats.rejected - rejected_before;
        }

        {
            let _timer = ScopedTimer::recording("sync", &mut self.profile.sync);
            let kin = Kinematics::compute(system, &self.state);
            sync::synchronize(system, &kin, models, &self.context.poses);
        }
        self.profile.outer_steps += 1;
        Ok(())
    }
}

impl PhysicsEngine for MultibodyEngine {
    fn name(&self) -> &str {
        MULTIBODY_ENGINE
    }

    fn load(&mut self, config: &EngineConfig) -> Result<(), PhysicsError> {
        config.validate()?;
        self.config = config.clone();
        self.gravity.set(DVec3::from_array(config.gravity));
        self.integrator = Self::integrator_for(config);
        log::info!(
            "{} engine loaded: step {} s, accuracy {}",
            MULTIBODY_ENGINE,
            config.step_time,
            config.accuracy
        );
        Ok(())
    }

    fn init(&mut self) -> Result<(), PhysicsError> {
        self.initialized = true;
        self.dirty = true;
        log::info!("{MULTIBODY_ENGINE} engine initialized");
        Ok(())
    }

    fn init_model(&mut self, id: ModelId, model: &Model) -> Result<(), PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        if !self.initialized {
            return Err(PhysicsError::NotInitialized);
        }
        let graph = self.graph_for(model)?;
        self.entries.retain(|e| e.id != id);
        self.entries.push(ModelEntry {
            id,
            model: model.clone(),
            graph,
        });
        self.dirty = true;
        Ok(())
    }

    fn remove_model(&mut self, id: ModelId, models: &Arena<Model>) -> Result<(), PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return Err(PhysicsError::UnknownModel(id));
        }
        self.refresh_entries(models)
    }

    fn reset(&mut self, models: &Arena<Model>) -> Result<(), PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        self.refresh_entries(models)?;
        self.discard_state = true;
        self.integrator.set_initial_step(self.config.step_time);
        self.profile.reset();
        Ok(())
    }

    fn update_physics(&mut self, models: &mut Arena<Model>, target_time: f64) -> Result<(), PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        let result = self.step(models, target_time);
        self.loads.clear();
        result
    }

    fn fini(&mut self) {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        self.profile.log_summary();
        self.entries.clear();
        self.system = None;
        self.initialized = false;
        log::info!("{MULTIBODY_ENGINE} engine finalized");
    }

    fn create_link(&self, model: &Model, name: &str) -> Link {
        Link::new(name).with_static(model.is_static)
    }

    fn create_joint(&self, joint_type: &str, model: &Model) -> Result<Joint, UnsupportedElementError> {
        let parsed = JointType::from_str(joint_type)?;
        if !parsed.is_supported() {
            return Err(UnsupportedElementError::JointType(joint_type.to_string()));
        }
        let name = format!("{}_joint_{}", model.name, model.joints().len());
        Ok(Joint::new(name, parsed, None, String::new()))
    }

    fn create_collision(&self, shape_type: &str, link: &Link) -> Result<Collision, UnsupportedElementError> {
        let parsed = ShapeType::from_str(shape_type)?;
        let name = format!("{}_collision_{}", link.name, link.collisions.len());
        Ok(Collision::new(name, parsed.default_shape()).with_material(self.config.contact_material))
    }

    fn set_gravity(&mut self, gravity: DVec3) {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        self.gravity.set(gravity);
        self.config.gravity = self.gravity.vector().to_array();
        if let Some(system) = self.system.as_mut() {
            system.gravity = self.gravity.vector();
        }
    }

    fn gravity(&self) -> Gravity {
        self.gravity
    }

    fn set_step_time(&mut self, step_time: f64) {
        if !(step_time.is_finite() && step_time > 0.0) {
            log::warn!("ignoring invalid step time {step_time}");
            return;
        }
        self.config.step_time = step_time;
        self.integrator.set_initial_step(step_time);
    }

    fn step_time(&self) -> f64 {
        self.config.step_time
    }

    fn time(&self) -> f64 {
        self.state.time
    }

    fn apply_link_force(&mut self, model: ModelId, link: LinkId, force: DVec3, point: DVec3) -> Result<bool, PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        let Some(body) = self.master_body(model, link)? else {
            return Ok(false);
        };
        self.loads.body_forces[body] += SpatialVec::force_at(force, point);
        Ok(true)
    }

    fn apply_link_torque(&mut self, model: ModelId, link: LinkId, torque: DVec3) -> Result<bool, PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        let Some(body) = self.master_body(model, link)? else {
            return Ok(false);
        };
        self.loads.body_forces[body] += SpatialVec::torque(torque);
        Ok(true)
    }

    fn apply_joint_force(&mut self, model: ModelId, joint: JointId, axis: usize, force: f64) -> Result<bool, PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        if !self.entries.iter().any(|e| e.id == model) {
            return Err(PhysicsError::UnknownModel(model));
        }
        self.realize()?;
        let Some(system) = self.system.as_ref() else {
            return Ok(false);
        };
        let Some(body) = system.joint_body(model, joint).map(|b| &system.bodies[b]) else {
            return Ok(false);
        };
        let Some((index, sign)) = body.joint_axis(axis) else {
            return Ok(false);
        };
        self.loads.mobility_forces[body.u_offset + index] += sign * force;
        Ok(true)
    }

    fn joint_position(&self, model: ModelId, joint: JointId, axis: usize) -> Option<f64> {
        let system = self.system.as_ref()?;
        let body = &system.bodies[system.joint_body(model, joint)?];
        if body.kind.has_quaternion() {
            return None;
        }
        let (index, sign) = body.joint_axis(axis)?;
        self.state.q.get(body.q_offset + index).map(|q| q * sign)
    }
}
