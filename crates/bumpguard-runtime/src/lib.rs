//! `bumpguard-runtime` – The Detection-to-Actuation Loop
//!
//! Turns a stream of camera frames into motor ramps and buzzer toggles.
//!
//! # Modules
//!
//! - [`detector`] – [`HazardDetector`][detector::HazardDetector]: the seam
//!   to the inference engine, plus [`ScriptedDetector`][detector::ScriptedDetector]
//!   which replays a schedule of hazard windows for simulation and tests.
//! - [`debounce`] – [`HazardDebouncer`][debounce::HazardDebouncer]: converts
//!   per-inspected-frame booleans into a stable
//!   [`HazardCondition`][bumpguard_types::HazardCondition].  Single-sample
//!   by default; a majority vote over the last K inspected frames is opt-in.
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: owns the
//!   hardware handles, applies the sampling cadence, reacts to transitions
//!   and runs the shutdown protocol exactly once on every exit path.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with optional OTLP export.

pub mod control_loop;
pub mod debounce;
pub mod detector;
pub mod telemetry;

pub use control_loop::{
    ControlLoop, ControlLoopConfig, ExitReason, RampMode, StatusFeed, StopHandle,
};
pub use debounce::{DebounceStrategy, HazardDebouncer};
pub use detector::{HAZARD_LABEL, HazardDetector, HazardWindow, ScriptedDetector, hazard_seen};
pub use telemetry::{TracerProviderGuard, init_tracing};
