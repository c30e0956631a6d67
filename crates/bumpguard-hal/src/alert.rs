//! Audible hazard alert (buzzer).
//!
//! [`AlertOutput`] is the driver-facing trait for a discrete on/off line;
//! [`AlertDevice`] wraps one and gives the control loop the idempotent
//! `activate` / `deactivate` / `release` contract.

use bumpguard_types::BumpError;
use tracing::{debug, info};

/// A discrete on/off output line driving the buzzer.
pub trait AlertOutput: Send {
    /// Stable identifier for this output, e.g. `"buzzer"`.
    fn id(&self) -> &str;

    /// Drive the line (`true` = sounding, `false` = silent).
    ///
    /// # Errors
    ///
    /// Returns [`BumpError::HardwareFault`] if the line cannot be driven.
    fn set_state(&mut self, active: bool) -> Result<(), BumpError>;

    /// Return the line's current state.
    fn state(&self) -> bool;

    /// Give the pin back to the system.  Must tolerate repeated calls.
    fn release(&mut self) -> Result<(), BumpError>;
}

/// Binary alert with no intermediate states.
pub struct AlertDevice {
    output: Box<dyn AlertOutput>,
    active: bool,
    released: bool,
}

impl AlertDevice {
    /// Wrap `output`, adopting whatever state the line reports.
    pub fn new(output: Box<dyn AlertOutput>) -> Self {
        let active = output.state();
        Self {
            output,
            active,
            released: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start sounding.  Calling it while already active does nothing.
    pub fn activate(&mut self) -> Result<(), BumpError> {
        self.drive(true)
    }

    /// Go silent.  Calling it while already silent does nothing, and after
    /// [`release`][Self::release] it is a no-op.
    pub fn deactivate(&mut self) -> Result<(), BumpError> {
        if self.released {
            return Ok(());
        }
        self.drive(false)
    }

    /// Silence the line and release the pin.  Idempotent.
    pub fn release(&mut self) -> Result<(), BumpError> {
        if self.released {
            return Ok(());
        }
        // Release even when the final silence command fails.
        let silenced = self.drive(false);
        let released = self.output.release();
        self.released = true;
        info!(alert = self.output.id(), "alert released");
        silenced.and(released)
    }

    fn drive(&mut self, active: bool) -> Result<(), BumpError> {
        if self.released {
            return Err(BumpError::hardware(self.output.id(), "alert line already released"));
        }
        if self.active == active {
            return Ok(());
        }
        self.output.set_state(active)?;
        self.active = active;
        debug!(alert = self.output.id(), active, "alert toggled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimAlert;

    #[test]
    fn activate_and_deactivate_are_idempotent() {
        let sim = SimAlert::new("buzzer");
        let probe = sim.probe();
        let mut alert = AlertDevice::new(Box::new(sim));

        alert.activate().unwrap();
        alert.activate().unwrap();
        assert!(alert.is_active());
        assert!(probe.state());

        alert.deactivate().unwrap();
        alert.deactivate().unwrap();
        assert!(!alert.is_active());

        // Repeats never reach the line.
        assert_eq!(probe.writes(), vec![true, false]);
    }

    #[test]
    fn release_silences_and_is_idempotent() {
        let sim = SimAlert::new("buzzer");
        let probe = sim.probe();
        let mut alert = AlertDevice::new(Box::new(sim));
        alert.activate().unwrap();

        alert.release().unwrap();
        alert.release().unwrap();
        assert!(!probe.state());
        assert_eq!(probe.release_count(), 1);

        alert.deactivate().unwrap();
        assert!(matches!(alert.activate(), Err(BumpError::HardwareFault { .. })));
    }
}
