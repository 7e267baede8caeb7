use super::state::{State, StateDerivative};
use crate::error::SolverError;

/// Continuous system the integrator can advance.
pub trait Dynamics {
    fn derivative(&self, state: &State) -> Result<StateDerivative, SolverError>;

    /// Restores coordinate invariants (unit quaternions) after a step.
    fn project(&self, state: &mut State);
}

/// Counters of one integrator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IntegratorStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Adaptive embedded Euler/Heun integrator with relative error control.
///
/// Time only moves forward: a target in the past leaves the state untouched,
/// and an accepted step never lands beyond the requested target.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub accuracy: f64,
    pub min_step_size: f64,
    pub max_internal_steps: u32,
    /// Step size to try next.
    step_size: f64,
    pub stats: IntegratorStats,
}

impl Integrator {
    const SAFETY: f64 = 0.9;
    const MIN_SCALE: f64 = 0.2;
    const MAX_SCALE: f64 = 5.0;

    pub fn new(accuracy: f64, initial_step: f64, min_step_size: f64, max_internal_steps: u32) -> Self {
        Self {
            accuracy,
            min_step_size,
            max_internal_steps,
            step_size: initial_step,
            stats: IntegratorStats::default(),
        }
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn set_initial_step(&mut self, step: f64) {
        self.step_size = step;
    }

    /// Largest scaled difference between the first and second order solutions.
    fn error_norm(low: &State, high: &State) -> f64 {
        let q = low.q.iter().zip(high.q.iter());
        let u = low.u.iter().zip(high.u.iter());
        q.chain(u)
            .map(|(a, b)| (a - b).abs() / (1.0 + b.abs()))
            .fold(0.0, f64::max)
    }

    /// Takes one accepted internal step towards `target`.
    ///
    /// Returns `false` without touching `state` when `target` is not ahead of it.
    pub fn advance<D: Dynamics>(&mut self, system: &D, state: &mut State, target: f64) -> Result<bool, SolverError> {
        if target <= state.time {
            return Ok(false);
        }
        let k1 = system.derivative(state)?;
        loop {
            let remaining = target - state.time;
            let h = self.step_size.min(remaining);

            let euler = state.offset(&k1, h);
            let k2 = system.derivative(&euler)?;
            let mut heun = state.clone();
            heun.q += (&k1.q_dot + &k2.q_dot) * (0.5 * h);
            heun.u += (&k1.u_dot + &k2.u_dot) * (0.5 * h);

            let error = Self::error_norm(&euler, &heun) / self.accuracy;
            if !error.is_finite() || !heun.is_finite() {
                return Err(SolverError::Diverged {
                    time: state.time,
                    reason: "non-finite coordinates".to_string(),
                });
            }

            let scale = if error > 0.0 {
                (Self::SAFETY / error.sqrt()).clamp(Self::MIN_SCALE, Self::MAX_SCALE)
            } else {
                Self::MAX_SCALE
            };

            if error <= 1.0 {
                heun.time = if h >= remaining { target } else { state.time + h };
                system.project(&mut heun);
                *state = heun;
                self.stats.accepted += 1;
                // A step clipped by the target does not say much about the next one.
                if h >= self.step_size * Self::MIN_SCALE {
                    self.step_size = h * scale;
                }
                return Ok(true);
            }

            self.stats.rejected += 1;
            self.step_size = h * scale;
            if self.step_size < self.min_step_size {
                return Err(SolverError::StepSizeUnderflow {
                    step: self.step_size,
                    min: self.min_step_size,
                    time: state.time,
                });
            }
        }
    }

    /// Advances until `state.time >= target`, returning the number of accepted steps.
    pub fn step_to<D: Dynamics>(&mut self, system: &D, state: &mut State, target: f64) -> Result<u32, SolverError> {
        let mut steps = 0u32;
        while state.time < target {
            if steps >= self.max_internal_steps {
                return Err(SolverError::TooManySteps {
                    limit: self.max_internal_steps,
                    target,
                });
            }
            if !self.advance(system, state, target)? {
                break;
            }
            steps += 1;
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;

    use super::*;

    /// q' = u, u' = -q
    struct Oscillator;

    impl Dynamics for Oscillator {
        fn derivative(&self, state: &State) -> Result<StateDerivative, SolverError> {
            Ok(StateDerivative {
                q_dot: state.u.clone(),
                u_dot: -state.q.clone(),
            })
        }

        fn project(&self, _state: &mut State) {}
    }

    #[test]
    fn past_target_is_a_no_op() {
        let mut integrator = Integrator::new(0.1, 0.01, 1e-9, 1000);
        let mut state = State::new(DVector::from_element(1, 1.0), DVector::zeros(1));
        state.time = 1.0;
        let before = state.clone();
        assert!(!integrator.advance(&Oscillator, &mut state, 0.5).unwrap());
        assert_eq!(state, before);
    }

    #[test]
    fn advance_never_passes_target() {
        let mut integrator = Integrator::new(0.1, 0.5, 1e-9, 1000);
        let mut state = State::new(DVector::from_element(1, 1.0), DVector::zeros(1));
        integrator.advance(&Oscillator, &mut state, 0.01).unwrap();
        assert!(state.time <= 0.01);
        assert!(state.time > 0.0);
    }
}
