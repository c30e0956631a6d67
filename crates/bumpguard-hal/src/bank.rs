//! [`ActuatorBank`] – the four drive motors behind one speed setpoint.
//!
//! All channels always carry the same duty cycle; there is no per-wheel
//! differential.  After the initial [`start`][ActuatorBank::start] the
//! setpoint only moves through [`ramp_to`][ActuatorBank::ramp_to] (or its
//! interruptible variant) until [`stop`][ActuatorBank::stop] forces it to
//! zero.
//!
//! # Ramps
//!
//! A ramp from `start` to `target` with step `s` applies
//! `ceil(|target - start| / s)` values: `start ± s`, `start ± 2s`, … and
//! finally `target` itself.  Every intermediate value lies strictly between
//! `start` and `target`; a remainder smaller than a thousandth of a step is
//! treated as none, so `k × s` rounding never lands an extra step on the
//! target.  Steps finer than [`MIN_RAMP_STEP_PERCENT`] are rejected.  The bank sleeps for the step delay after each
//! applied value, so a ramp takes `steps × delay` and blocks the caller for
//! that long.
//!
//! ```rust
//! use bumpguard_hal::bank::ramp_plan;
//!
//! let plan = ramp_plan(100.0, 0.0, 10.0);
//! assert_eq!(plan.len(), 10);
//! assert_eq!(plan.first().copied(), Some(90.0));
//! assert_eq!(plan.last().copied(), Some(0.0));
//! ```

use std::thread;
use std::time::Duration;

use bumpguard_types::BumpError;
use tracing::{debug, info, instrument, warn};

use crate::motor::MotorChannel;

/// Number of drive channels on the vehicle.
pub const MOTOR_COUNT: usize = 4;

const MIN_PERCENT: f32 = 0.0;
const MAX_PERCENT: f32 = 100.0;

/// Finest ramp increment accepted, in percent.
pub const MIN_RAMP_STEP_PERCENT: f32 = 0.1;

/// Fraction of a step below which the remaining distance counts as zero, so
/// float rounding in `k × step` cannot add a step that lands on the target.
const STEP_TOLERANCE: f32 = 1e-3;

/// How a ramp ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampOutcome {
    /// The target was reached and applied.
    Completed,
    /// The interrupt predicate fired between steps; `at` is the setpoint left
    /// applied on every channel.
    Interrupted { at: f32 },
}

/// Compute the values a ramp from `start` to `target` applies, in order.
///
/// Both ends are clamped to `[0, 100]`.  Returns an empty plan when the two
/// are equal or `step` is below [`MIN_RAMP_STEP_PERCENT`].
pub fn ramp_plan(start: f32, target: f32, step: f32) -> Vec<f32> {
    let start = clamp_percent(start);
    let target = clamp_percent(target);
    if !(step.is_finite() && step >= MIN_RAMP_STEP_PERCENT) || start == target {
        return Vec::new();
    }

    let direction = (target - start).signum();
    let slack = step * STEP_TOLERANCE;

    // Offsets are computed from `start` rather than accumulated, and every
    // intermediate value stays strictly short of the target.
    let mut plan: Vec<f32> = (1u32..)
        .map(|k| start + direction * step * k as f32)
        .take_while(|v| (target - v) * direction > slack)
        .collect();
    plan.push(target);
    plan
}

fn clamp_percent(percent: f32) -> f32 {
    if percent.is_nan() {
        return MIN_PERCENT;
    }
    percent.clamp(MIN_PERCENT, MAX_PERCENT)
}

/// Exclusive owner of the four drive channels.
pub struct ActuatorBank {
    channels: [Box<dyn MotorChannel>; MOTOR_COUNT],
    setpoint: f32,
    released: bool,
}

impl ActuatorBank {
    /// Take ownership of the four channels.  The setpoint starts at zero;
    /// call [`start`][Self::start] to bring the vehicle to cruising speed.
    pub fn new(channels: [Box<dyn MotorChannel>; MOTOR_COUNT]) -> Self {
        Self {
            channels,
            setpoint: MIN_PERCENT,
            released: false,
        }
    }

    /// Current shared setpoint in percent.
    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    /// Whether [`stop`][Self::stop] has already released the channels.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Channel identifiers in bank order.
    pub fn channel_ids(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.id().to_string()).collect()
    }

    /// Apply the initial cruising setpoint without ramping.
    pub fn start(&mut self, cruise_percent: f32) -> Result<(), BumpError> {
        self.set_all(cruise_percent)?;
        info!(setpoint = self.setpoint, "drive channels started");
        Ok(())
    }

    /// Apply `percent` (clamped to `[0, 100]`) to every channel.
    ///
    /// # Errors
    ///
    /// Returns [`BumpError::HardwareFault`] when the bank has been stopped or
    /// a channel rejects the value.
    pub fn set_all(&mut self, percent: f32) -> Result<(), BumpError> {
        if self.released {
            return Err(BumpError::hardware("actuator_bank", "drive channels already released"));
        }
        let percent = clamp_percent(percent);
        for channel in self.channels.iter_mut() {
            channel.set_duty_cycle(percent)?;
        }
        self.setpoint = percent;
        Ok(())
    }

    /// Walk the setpoint to `target_percent` in increments of `step_percent`,
    /// pausing `step_delay` after each applied value.  Blocks until done.
    pub fn ramp_to(
        &mut self,
        target_percent: f32,
        step_percent: f32,
        step_delay: Duration,
    ) -> Result<(), BumpError> {
        self.ramp_to_until(target_percent, step_percent, step_delay, |_| false)
            .map(|_| ())
    }

    /// Like [`ramp_to`][Self::ramp_to], but asks `interrupt` between steps
    /// (never after the final one) whether to abandon the ramp.  The
    /// predicate receives the setpoint currently applied.
    #[instrument(skip(self, interrupt), fields(from = self.setpoint))]
    pub fn ramp_to_until<F>(
        &mut self,
        target_percent: f32,
        step_percent: f32,
        step_delay: Duration,
        mut interrupt: F,
    ) -> Result<RampOutcome, BumpError>
    where
        F: FnMut(f32) -> bool,
    {
        if !(step_percent.is_finite() && step_percent >= MIN_RAMP_STEP_PERCENT) {
            return Err(BumpError::Config(format!(
                "ramp step must be at least {MIN_RAMP_STEP_PERCENT}%, got {step_percent}"
            )));
        }

        let plan = ramp_plan(self.setpoint, target_percent, step_percent);
        let last = plan.len().saturating_sub(1);
        for (i, value) in plan.into_iter().enumerate() {
            self.set_all(value)?;
            debug!(step = i + 1, setpoint = value, "ramp step applied");
            if !step_delay.is_zero() {
                thread::sleep(step_delay);
            }
            if i < last && interrupt(value) {
                info!(at = value, "ramp interrupted");
                return Ok(RampOutcome::Interrupted { at: value });
            }
        }

        info!(setpoint = self.setpoint, "ramp complete");
        Ok(RampOutcome::Completed)
    }

    /// Force every channel to zero and release the PWM lines.
    ///
    /// Safe to call repeatedly and from a failure path: every channel is
    /// attempted even when an earlier one fails, and the first error is
    /// returned.  Calls after the first successful release do nothing.
    pub fn stop(&mut self) -> Result<(), BumpError> {
        if self.released {
            return Ok(());
        }

        let mut first_err = None;
        for channel in self.channels.iter_mut() {
            if let Err(e) = channel.set_duty_cycle(MIN_PERCENT) {
                warn!(channel = channel.id(), error = %e, "failed to zero drive channel");
                first_err.get_or_insert(e);
            }
        }
        for channel in self.channels.iter_mut() {
            if let Err(e) = channel.release() {
                warn!(channel = channel.id(), error = %e, "failed to release drive channel");
                first_err.get_or_insert(e);
            }
        }
        self.setpoint = MIN_PERCENT;
        self.released = true;
        info!("drive channels stopped and released");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ActuatorBank {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "actuator bank stop on drop failed");
        }
    }
}
