use approx::assert_abs_diff_eq;
use mobod::dynamics::{Dynamics, Integrator, State, StateDerivative};
use mobod::SolverError;
use nalgebra::DVector;

/// Unit harmonic oscillator: q' = u, u' = -q.
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

/// Nothing changes; the integrator grows its step as fast as it may.
struct Frozen;

impl Dynamics for Frozen {
    fn derivative(&self, state: &State) -> Result<StateDerivative, SolverError> {
        Ok(StateDerivative {
            q_dot: DVector::zeros(state.q.len()),
            u_dot: DVector::zeros(state.u.len()),
        })
    }

    fn project(&self, _state: &mut State) {}
}

struct Exploding;

impl Dynamics for Exploding {
    fn derivative(&self, state: &State) -> Result<StateDerivative, SolverError> {
        Ok(StateDerivative {
            q_dot: DVector::from_element(state.q.len(), f64::NAN),
            u_dot: DVector::zeros(state.u.len()),
        })
    }

    fn project(&self, _state: &mut State) {}
}

fn oscillator_state() -> State {
    State::new(DVector::from_element(1, 1.0), DVector::zeros(1))
}

#[test]
fn test_step_to_reaches_target() {
    let mut integrator = Integrator::new(0.1, 0.001, 1e-9, 100_000);
    let mut state = oscillator_state();
    let steps = integrator.step_to(&Oscillator, &mut state, 0.25).unwrap();
    assert!(steps > 0);
    assert!(state.time >= 0.25);
}

#[test]
fn test_time_never_moves_backwards() {
    let mut integrator = Integrator::new(0.1, 0.01, 1e-9, 100_000);
    let mut state = oscillator_state();
    let mut last = state.time;
    for target in [0.1, 0.1, 0.35, 0.2, 0.5, 0.5, 1.0] {
        integrator.step_to(&Oscillator, &mut state, target).unwrap();
        assert!(state.time >= last);
        assert!(state.time >= target);
        last = state.time;
    }
    assert!(state.time >= 1.0);
}

#[test]
fn test_past_target_leaves_state_untouched() {
    let mut integrator = Integrator::new(0.1, 0.01, 1e-9, 100_000);
    let mut state = oscillator_state();
    integrator.step_to(&Oscillator, &mut state, 0.5).unwrap();
    let before = state.clone();
    let steps = integrator.step_to(&Oscillator, &mut state, 0.1).unwrap();
    assert_eq!(steps, 0);
    assert_eq!(state, before);
}

#[test]
fn test_oscillator_tracks_cosine_at_tight_accuracy() {
    let mut integrator = Integrator::new(1e-6, 0.001, 1e-12, 1_000_000);
    let mut state = oscillator_state();
    integrator.step_to(&Oscillator, &mut state, 1.0).unwrap();
    assert_abs_diff_eq!(state.time, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(state.q[0], 1.0f64.cos(), epsilon = 1e-3);
    assert_abs_diff_eq!(state.u[0], -1.0f64.sin(), epsilon = 1e-3);
}

#[test]
fn test_step_size_adapts_to_error() {
    let mut loose = Integrator::new(0.1, 0.001, 1e-9, 100_000);
    let mut tight = Integrator::new(1e-6, 0.001, 1e-12, 1_000_000);
    let mut a = oscillator_state();
    let mut b = oscillator_state();
    let loose_steps = loose.step_to(&Oscillator, &mut a, 2.0).unwrap();
    let tight_steps = tight.step_to(&Oscillator, &mut b, 2.0).unwrap();
    assert!(tight_steps > loose_steps);
}

#[test]
fn test_unreachable_accuracy_underflows() {
    let mut integrator = Integrator::new(1e-14, 0.1, 1e-3, 100_000);
    let mut state = oscillator_state();
    let err = integrator.step_to(&Oscillator, &mut state, 1.0).unwrap_err();
    assert!(matches!(err, SolverError::StepSizeUnderflow { .. }));
    assert!(integrator.stats.rejected > 0);
}

#[test]
fn test_non_finite_state_is_divergence() {
    let mut integrator = Integrator::new(0.1, 0.01, 1e-9, 100_000);
    let mut state = oscillator_state();
    let err = integrator.step_to(&Exploding, &mut state, 1.0).unwrap_err();
    assert!(matches!(err, SolverError::Diverged { .. }));
    assert_eq!(state.time, 0.0);
}

#[test]
fn test_internal_step_limit() {
    let mut integrator = Integrator::new(0.1, 0.001, 1e-9, 3);
    let mut state = oscillator_state();
    let err = integrator.step_to(&Frozen, &mut state, 1.0).unwrap_err();
    assert_eq!(
        err,
        SolverError::TooManySteps {
            limit: 3,
            target: 1.0
        }
    );
}
