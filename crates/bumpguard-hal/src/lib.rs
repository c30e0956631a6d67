//! `bumpguard-hal` – Hardware Abstraction Layer
//!
//! Everything the controller drives or reads goes through a trait defined
//! here, so the control loop never touches a GPIO line or a camera API
//! directly.
//!
//! # Modules
//!
//! - [`motor`] – [`MotorChannel`][motor::MotorChannel]: one PWM-driven drive
//!   motor.
//! - [`bank`] – [`ActuatorBank`][bank::ActuatorBank]: owns the four drive
//!   channels and exposes `set_all`, `ramp_to` and `stop` over a single
//!   shared speed setpoint.
//! - [`alert`] – [`AlertOutput`][alert::AlertOutput] and
//!   [`AlertDevice`][alert::AlertDevice]: the buzzer line.
//! - [`camera`] – [`FrameSource`][camera::FrameSource]: produces frames on
//!   demand.
//! - [`pins`] – [`HardwarePins`][pins::HardwarePins]: channel identifiers of
//!   the rig, passed through to drivers.
//! - [`sim`] – in-process simulated drivers with shared probes for tests and
//!   headless runs.

pub mod alert;
pub mod bank;
pub mod camera;
pub mod motor;
pub mod pins;
pub mod sim;

pub use alert::{AlertDevice, AlertOutput};
pub use bank::{ActuatorBank, MIN_RAMP_STEP_PERCENT, MOTOR_COUNT, RampOutcome, ramp_plan};
pub use camera::FrameSource;
pub use motor::MotorChannel;
pub use pins::{HardwarePins, MotorPins};
