//! `bumpguard-kernel` – Safety Supervision
//!
//! Decides when a per-frame problem has gone on long enough to become fatal.
//! It does not touch hardware; the control loop consults it and runs the
//! shutdown protocol when told to.
//!
//! # Modules
//!
//! - [`watchdog`] – [`Watchdog`][watchdog::Watchdog]: detects a frame source
//!   that has stopped delivering frames.
//! - [`failure_streak`] – [`FailureStreak`][failure_streak::FailureStreak]:
//!   escalates after too many consecutive failures of the same kind
//!   (detector errors, transient capture errors).

pub mod failure_streak;
pub mod watchdog;

pub use failure_streak::FailureStreak;
pub use watchdog::{ComponentHealth, Watchdog};
