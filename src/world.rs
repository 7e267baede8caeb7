use std::sync::Arc;

use crate::{
    config::EngineConfig,
    core::Model,
    dynamics::PoseQueue,
    engine::{create_engine, EngineContext, PhysicsEngine, PhysicsLock},
    error::PhysicsError,
    utils::{Arena, ModelId},
};

/// Simulation context owning the models, the simulated clock and the physics engine.
///
/// Topology changes and steps are serialized through the shared physics lock,
/// so another context holding [`World::physics_lock`] excludes both.
pub struct World {
    config: EngineConfig,
    models: Arena<Model>,
    engine: Box<dyn PhysicsEngine>,
    context: EngineContext,
    sim_time: f64,
    paused: bool,
}

impl World {
    pub fn new(config: EngineConfig) -> Result<Self, PhysicsError> {
        config.validate()?;
        let context = EngineContext::new();
        let mut engine = create_engine(&config.engine, context.clone())?;
        engine.load(&config)?;
        engine.init()?;
        Ok(Self {
            config,
            models: Arena::new(),
            engine,
            context,
            sim_time: 0.0,
            paused: false,
        })
    }

    /// Adds a model and initialises it in the engine.
    ///
    /// A model the engine rejects is not kept.
    pub fn insert_model(&mut self, model: Model) -> Result<ModelId, PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        let id = self.models.insert(model);
        let result = match self.models.get(id) {
            Some(stored) => self.engine.init_model(id, stored),
            None => Err(PhysicsError::UnknownModel(id)),
        };
        if let Err(err) = result {
            self.models.remove(id);
            log::warn!("model rejected: {err}");
            return Err(err);
        }
        Ok(id)
    }

    pub fn remove_model(&mut self, id: ModelId) -> Result<Model, PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        if !self.models.contains(id) {
            return Err(PhysicsError::UnknownModel(id));
        }
        self.engine.remove_model(id, &self.models)?;
        self.models.remove(id).ok_or(PhysicsError::UnknownModel(id))
    }

    /// Returns every model to its default pose and the clock to zero.
    pub fn reset(&mut self) -> Result<(), PhysicsError> {
        let lock = Arc::clone(&self.context.physics_lock);
        let _guard = lock.lock();
        for (_, model) in self.models.iter_mut() {
            model.reset_poses();
        }
        self.engine.reset(&self.models)?;
        self.sim_time = 0.0;
        Ok(())
    }

    /// Advances one step unless paused. Returns whether a step ran.
    pub fn step(&mut self) -> Result<bool, PhysicsError> {
        if self.paused {
            return Ok(false);
        }
        self.step_once()?;
        Ok(true)
    }

    /// Advances exactly one step, paused or not.
    pub fn step_once(&mut self) -> Result<(), PhysicsError> {
        let target = self.sim_time + self.engine.step_time();
        self.engine.update_physics(&mut self.models, target)?;
        self.sim_time = target;
        Ok(())
    }

    /// Runs `steps` calls to [`World::step`], stopping at the first error.
    pub fn run(&mut self, steps: usize) -> Result<usize, PhysicsError> {
        let mut taken = 0;
        for _ in 0..steps {
            if self.step()? {
                taken += 1;
            }
        }
        Ok(taken)
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn models(&self) -> &Arena<Model> {
        &self.models
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id)
    }

    pub fn engine(&self) -> &dyn PhysicsEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn PhysicsEngine {
        self.engine.as_mut()
    }

    pub fn set_gravity(&mut self, gravity: glam::DVec3) {
        self.engine.set_gravity(gravity);
        self.config.gravity = gravity.to_array();
    }

    pub fn set_step_time(&mut self, step_time: f64) {
        self.engine.set_step_time(step_time);
        self.config.step_time = self.engine.step_time();
    }

    /// Handle on the pending pose updates; draining it never takes the physics lock.
    pub fn pose_queue(&self) -> PoseQueue {
        self.context.poses.clone()
    }

    pub fn physics_lock(&self) -> PhysicsLock {
        Arc::clone(&self.context.physics_lock)
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.engine.fini();
    }
}
