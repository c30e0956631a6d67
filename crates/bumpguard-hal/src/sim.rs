//! In-process simulated drivers for tests and headless runs.
//!
//! Every simulated driver records the commands it receives into shared state
//! reachable through a cloneable probe, so a test can hand the driver to the
//! control loop and still assert on what the loop did with it.
//!
//! | Driver | Probe | Records |
//! |---|---|---|
//! | [`SimMotor`] | [`MotorProbe`] | every applied duty cycle, release calls |
//! | [`SimAlert`] | [`AlertProbe`] | every line write, release calls |
//! | [`SimCamera`] | [`CameraProbe`] | capture attempts, release calls |
//!
//! [`SimRig`] assembles a complete vehicle from [`HardwarePins`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use bumpguard_hal::sim::SimRig;
//!
//! let mut rig = SimRig::new();
//! rig.bank.start(100.0).unwrap();
//! rig.bank.ramp_to(0.0, 10.0, Duration::ZERO).unwrap();
//! assert_eq!(rig.motors[0].duty(), 0.0);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use bumpguard_types::{BumpError, Frame};
use chrono::Utc;

use crate::alert::{AlertDevice, AlertOutput};
use crate::bank::{ActuatorBank, MOTOR_COUNT};
use crate::camera::FrameSource;
use crate::motor::MotorChannel;
use crate::pins::HardwarePins;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated motor
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MotorRecord {
    history: Vec<f32>,
    releases: u32,
    faulted: bool,
}

/// Shared view of a [`SimMotor`]'s recorded commands.
#[derive(Debug, Clone, Default)]
pub struct MotorProbe(Arc<Mutex<MotorRecord>>);

impl MotorProbe {
    /// Every duty cycle applied so far, oldest first.
    pub fn history(&self) -> Vec<f32> {
        lock(&self.0).history.clone()
    }

    /// The last applied duty cycle (`0.0` if none).
    pub fn duty(&self) -> f32 {
        lock(&self.0).history.last().copied().unwrap_or(0.0)
    }

    pub fn release_count(&self) -> u32 {
        lock(&self.0).releases
    }

    /// Make subsequent `set_duty_cycle` calls fail (or succeed again).
    pub fn inject_fault(&self, faulted: bool) {
        lock(&self.0).faulted = faulted;
    }
}

/// A simulated PWM motor channel.
pub struct SimMotor {
    id: String,
    record: MotorProbe,
}

impl SimMotor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record: MotorProbe::default(),
        }
    }

    pub fn probe(&self) -> MotorProbe {
        self.record.clone()
    }
}

impl MotorChannel for SimMotor {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_duty_cycle(&mut self, percent: f32) -> Result<(), BumpError> {
        let mut rec = lock(&self.record.0);
        if rec.faulted {
            return Err(BumpError::hardware(&self.id, "simulated pwm fault"));
        }
        rec.history.push(percent);
        Ok(())
    }

    fn duty_cycle(&self) -> f32 {
        self.record.duty()
    }

    fn release(&mut self) -> Result<(), BumpError> {
        lock(&self.record.0).releases += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated alert
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct AlertRecord {
    writes: Vec<bool>,
    releases: u32,
}

/// Shared view of a [`SimAlert`]'s recorded writes.
#[derive(Debug, Clone, Default)]
pub struct AlertProbe(Arc<Mutex<AlertRecord>>);

impl AlertProbe {
    /// Every state written to the line, oldest first.
    pub fn writes(&self) -> Vec<bool> {
        lock(&self.0).writes.clone()
    }

    pub fn state(&self) -> bool {
        lock(&self.0).writes.last().copied().unwrap_or(false)
    }

    pub fn release_count(&self) -> u32 {
        lock(&self.0).releases
    }
}

/// A simulated buzzer line.
pub struct SimAlert {
    id: String,
    record: AlertProbe,
}

impl SimAlert {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record: AlertProbe::default(),
        }
    }

    pub fn probe(&self) -> AlertProbe {
        self.record.clone()
    }
}

impl AlertOutput for SimAlert {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_state(&mut self, active: bool) -> Result<(), BumpError> {
        lock(&self.record.0).writes.push(active);
        Ok(())
    }

    fn state(&self) -> bool {
        self.record.state()
    }

    fn release(&mut self) -> Result<(), BumpError> {
        lock(&self.record.0).releases += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated camera
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CameraRecord {
    attempts: u64,
    releases: u32,
}

/// Shared view of a [`SimCamera`]'s activity.
#[derive(Debug, Clone, Default)]
pub struct CameraProbe(Arc<Mutex<CameraRecord>>);

impl CameraProbe {
    /// Number of `next_frame` calls, successful or not.
    pub fn attempts(&self) -> u64 {
        lock(&self.0).attempts
    }

    pub fn release_count(&self) -> u32 {
        lock(&self.0).releases
    }
}

/// A simulated camera producing blank RGB frames.
///
/// Failures are scripted by capture attempt number (1-based): a one-off
/// failure with [`fail_at`][Self::fail_at], or a permanent one from some
/// attempt onward with [`fail_from`][Self::fail_from].  Successful frames
/// are numbered consecutively regardless of failed attempts.
pub struct SimCamera {
    id: String,
    width: u32,
    height: u32,
    delay: Duration,
    one_off: HashMap<u64, BumpError>,
    from: Option<(u64, BumpError)>,
    sequence: u64,
    record: CameraProbe,
}

impl SimCamera {
    /// 640×480 RGB, the road camera's preview resolution.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_resolution(id, 640, 480)
    }

    pub fn with_resolution(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            delay: Duration::ZERO,
            one_off: HashMap::new(),
            from: None,
            sequence: 0,
            record: CameraProbe::default(),
        }
    }

    /// Sleep this long inside every capture, mimicking sensor exposure.
    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail capture attempt `attempt` with `error`.
    pub fn fail_at(mut self, attempt: u64, error: BumpError) -> Self {
        self.one_off.insert(attempt, error);
        self
    }

    /// Fail every capture attempt from `attempt` onward with `error`.
    pub fn fail_from(mut self, attempt: u64, error: BumpError) -> Self {
        self.from = Some((attempt, error));
        self
    }

    pub fn probe(&self) -> CameraProbe {
        self.record.clone()
    }
}

impl FrameSource for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn next_frame(&mut self) -> Result<Frame, BumpError> {
        let attempt = {
            let mut rec = lock(&self.record.0);
            rec.attempts += 1;
            rec.attempts
        };
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if let Some(err) = self.one_off.remove(&attempt) {
            return Err(err);
        }
        if let Some((start, err)) = &self.from
            && attempt >= *start
        {
            return Err(err.clone());
        }

        self.sequence += 1;
        Ok(Frame {
            width: self.width,
            height: self.height,
            data: vec![0u8; (self.width * self.height * 3) as usize],
            sequence: self.sequence,
            captured_at: Utc::now(),
        })
    }

    fn release(&mut self) -> Result<(), BumpError> {
        lock(&self.record.0).releases += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRig
// ────────────────────────────────────────────────────────────────────────────

/// A complete simulated vehicle: four motors in an [`ActuatorBank`], a buzzer
/// in an [`AlertDevice`], a [`SimCamera`], and probes onto all of them.
///
/// The camera is kept unboxed so tests can script it before handing it to
/// the control loop.
pub struct SimRig {
    pub bank: ActuatorBank,
    pub alert: AlertDevice,
    pub camera: SimCamera,
    pub motors: [MotorProbe; MOTOR_COUNT],
    pub alert_probe: AlertProbe,
    pub camera_probe: CameraProbe,
}

impl SimRig {
    /// A rig wired with the default [`HardwarePins`].
    pub fn new() -> Self {
        Self::from_pins(&HardwarePins::default())
    }

    /// A rig whose driver identifiers follow `pins`.
    pub fn from_pins(pins: &HardwarePins) -> Self {
        let motors = pins.motor_ids().map(SimMotor::new);
        let probes: [MotorProbe; MOTOR_COUNT] = std::array::from_fn(|i| motors[i].probe());
        let channels = motors.map(|m| Box::new(m) as Box<dyn MotorChannel>);

        let buzzer = SimAlert::new(pins.alert_id());
        let alert_probe = buzzer.probe();
        let camera = SimCamera::new("front_rgb");
        let camera_probe = camera.probe();

        Self {
            bank: ActuatorBank::new(channels),
            alert: AlertDevice::new(Box::new(buzzer)),
            camera,
            motors: probes,
            alert_probe,
            camera_probe,
        }
    }

    /// Swap in a scripted camera, keeping its probe in sync.
    pub fn with_camera(mut self, camera: SimCamera) -> Self {
        self.camera_probe = camera.probe();
        self.camera = camera;
        self
    }
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_motor_records_history() {
        let mut motor = SimMotor::new("m");
        let probe = motor.probe();
        motor.set_duty_cycle(10.0).unwrap();
        motor.set_duty_cycle(20.0).unwrap();
        assert_eq!(probe.history(), vec![10.0, 20.0]);
        assert_eq!(motor.duty_cycle(), 20.0);
    }

    #[test]
    fn sim_motor_fault_injection() {
        let mut motor = SimMotor::new("m");
        let probe = motor.probe();
        probe.inject_fault(true);
        assert!(motor.set_duty_cycle(10.0).is_err());
        probe.inject_fault(false);
        motor.set_duty_cycle(10.0).unwrap();
        assert_eq!(probe.history(), vec![10.0]);
    }

    #[test]
    fn sim_camera_numbers_successful_frames() {
        let mut cam = SimCamera::with_resolution("cam", 4, 4)
            .fail_at(2, BumpError::CaptureTransient("busy".into()));
        assert_eq!(cam.next_frame().unwrap().sequence, 1);
        assert!(matches!(cam.next_frame(), Err(BumpError::CaptureTransient(_))));
        let frame = cam.next_frame().unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.data.len(), 4 * 4 * 3);
        assert_eq!(cam.probe().attempts(), 3);
    }

    #[test]
    fn sim_camera_permanent_failure() {
        let mut cam = SimCamera::with_resolution("cam", 1, 1)
            .fail_from(2, BumpError::CaptureFatal("unplugged".into()));
        cam.next_frame().unwrap();
        assert!(matches!(cam.next_frame(), Err(BumpError::CaptureFatal(_))));
        assert!(matches!(cam.next_frame(), Err(BumpError::CaptureFatal(_))));
    }

    #[test]
    fn sim_rig_uses_pin_identifiers() {
        let rig = SimRig::new();
        assert_eq!(
            rig.bank.channel_ids(),
            vec!["motor_1@bcm12", "motor_2@bcm13", "motor_3@bcm18", "motor_4@bcm19"]
        );
        assert!(rig.alert_probe.writes().is_empty());
        assert!(!rig.alert.is_active());
    }
}
