use log::{log_enabled, Level};
use std::time::{Duration, Instant};

/// Scoped timer for the phases of a physics update.
///
/// Emits trace-level start/end lines and, when built with [`ScopedTimer::recording`],
/// accumulates the elapsed time into a profile slot.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
    output: Option<&'a mut Duration>,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("start {label}");
        }
        Self {
            label,
            start: Instant::now(),
            output: None,
        }
    }

    pub fn recording(label: &'a str, output: &'a mut Duration) -> Self {
        let mut timer = Self::new(label);
        timer.output = Some(output);
        timer
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if let Some(output) = self.output.as_deref_mut() {
            *output += elapsed;
        }
        if log_enabled!(Level::Trace) {
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Accumulated timings and counters of the engine's phases.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfile {
    pub graph_build: Duration,
    pub system_build: Duration,
    pub integrate: Duration,
    pub sync: Duration,
    pub outer_steps: u64,
    pub internal_steps: u64,
    pub rejected_steps: u64,
}

impl StepProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn log_summary(&self) {
        if self.outer_steps == 0 {
            return;
        }
        log::debug!(
            "physics profile: {} outer / {} internal steps ({} rejected), integrate {:.2} ms, sync {:.2} ms, build {:.2} ms",
            self.outer_steps,
            self.internal_steps,
            self.rejected_steps,
            self.integrate.as_secs_f64() * 1000.0,
            self.sync.as_secs_f64() * 1000.0,
            (self.graph_build + self.system_build).as_secs_f64() * 1000.0,
        );
    }
}
