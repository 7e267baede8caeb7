//! Configuration constants and the loadable engine configuration.

use serde::{Deserialize, Serialize};

use crate::core::types::ContactMaterial;
use crate::error::PhysicsError;

/// Name under which the reduced-coordinate engine is registered.
pub const DEFAULT_ENGINE: &str = "multibody";

/// Default gravity vector applied in the physics world (Z-up).
pub const DEFAULT_GRAVITY: [f64; 3] = [0.0, 0.0, -9.8];

/// Default outer step (in seconds) the world advances per update.
pub const DEFAULT_STEP_TIME: f64 = 0.001;

/// Relative accuracy requested from the adaptive integrator.
pub const DEFAULT_ACCURACY: f64 = 0.1;

/// Smallest internal step the integrator may take before giving up.
pub const DEFAULT_MIN_STEP_SIZE: f64 = 1e-9;

/// Slip speed below which friction ramps up towards static friction.
pub const DEFAULT_TRANSITION_VELOCITY: f64 = 0.1;

/// Baumgarte rate (1/s) pulling welded slave bodies back onto their masters.
pub const DEFAULT_WELD_STABILIZATION: f64 = 20.0;

/// Upper bound on internal steps per outer step.
pub const DEFAULT_MAX_INTERNAL_STEPS: u32 = 100_000;

/// Engine configuration as handed over by the world loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: String,
    pub gravity: [f64; 3],
    pub step_time: f64,
    pub accuracy: f64,
    pub min_step_size: f64,
    pub max_internal_steps: u32,
    pub transition_velocity: f64,
    pub weld_stabilization: f64,
    pub contact_material: ContactMaterial,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: DEFAULT_ENGINE.to_string(),
            gravity: DEFAULT_GRAVITY,
            step_time: DEFAULT_STEP_TIME,
            accuracy: DEFAULT_ACCURACY,
            min_step_size: DEFAULT_MIN_STEP_SIZE,
            max_internal_steps: DEFAULT_MAX_INTERNAL_STEPS,
            transition_velocity: DEFAULT_TRANSITION_VELOCITY,
            weld_stabilization: DEFAULT_WELD_STABILIZATION,
            contact_material: ContactMaterial::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_gravity(mut self, gravity: [f64; 3]) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_step_time(mut self, step_time: f64) -> Self {
        self.step_time = step_time;
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn validate(&self) -> Result<(), PhysicsError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(PhysicsError::InvalidConfig {
                    reason: format!("{name} must be positive and finite, got {value}"),
                })
            }
        };
        positive("step_time", self.step_time)?;
        positive("accuracy", self.accuracy)?;
        positive("min_step_size", self.min_step_size)?;
        positive("transition_velocity", self.transition_velocity)?;
        if !self.weld_stabilization.is_finite() || self.weld_stabilization < 0.0 {
            return Err(PhysicsError::InvalidConfig {
                reason: format!(
                    "weld_stabilization must be non-negative, got {}",
                    self.weld_stabilization
                ),
            });
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(PhysicsError::InvalidConfig {
                reason: "gravity must be finite".to_string(),
            });
        }
        if self.max_internal_steps == 0 {
            return Err(PhysicsError::InvalidConfig {
                reason: "max_internal_steps must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
