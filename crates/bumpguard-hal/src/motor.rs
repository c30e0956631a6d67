//! `MotorChannel` trait for PWM-driven drive motors.
//!
//! A channel is one wheel: a direction pin pair held at "forward" plus an
//! enable pin carrying the PWM duty cycle.  The
//! [`ActuatorBank`][crate::bank::ActuatorBank] owns four of them and is the
//! only caller of the mutating methods.

use bumpguard_types::BumpError;

/// One speed-controlled drive motor.
pub trait MotorChannel: Send {
    /// Stable identifier for this channel, e.g. `"motor_1"`.
    fn id(&self) -> &str;

    /// Apply a PWM duty cycle in percent (`0.0` = stopped, `100.0` = full
    /// power).  The caller guarantees the value is already clamped.
    ///
    /// # Errors
    ///
    /// Returns [`BumpError::HardwareFault`] if the duty cycle cannot be
    /// applied (e.g. the PWM line was released or the driver faulted).
    fn set_duty_cycle(&mut self, percent: f32) -> Result<(), BumpError>;

    /// Return the most recently applied duty cycle.
    fn duty_cycle(&self) -> f32;

    /// Stop PWM output and give the underlying pins back to the system.
    ///
    /// Must tolerate being called more than once.
    fn release(&mut self) -> Result<(), BumpError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimMotor;

    fn channel(id: &str) -> (Box<dyn MotorChannel>, crate::sim::MotorProbe) {
        let motor = SimMotor::new(id);
        let recorded = motor.probe();
        (Box::new(motor), recorded)
    }

    #[test]
    fn duty_cycle_reports_last_applied_value() {
        let (mut motor, recorded) = channel("motor_1@bcm12");
        assert_eq!(motor.id(), "motor_1@bcm12");
        assert_eq!(motor.duty_cycle(), 0.0);

        motor.set_duty_cycle(55.0).unwrap();
        motor.set_duty_cycle(45.0).unwrap();
        assert!((motor.duty_cycle() - 45.0).abs() < f32::EPSILON);
        assert_eq!(recorded.history(), vec![55.0, 45.0]);
    }

    #[test]
    fn release_tolerates_repeated_calls() {
        let (mut motor, recorded) = channel("motor_2@bcm13");
        motor.set_duty_cycle(100.0).unwrap();
        motor.release().unwrap();
        motor.release().unwrap();
        assert_eq!(recorded.release_count(), 2);
    }

    #[test]
    fn driver_fault_names_the_channel_and_keeps_last_duty() {
        let (mut motor, recorded) = channel("motor_3@bcm18");
        motor.set_duty_cycle(70.0).unwrap();
        recorded.inject_fault(true);

        match motor.set_duty_cycle(60.0) {
            Err(BumpError::HardwareFault { component, .. }) => assert_eq!(component, "motor_3@bcm18"),
            other => panic!("expected a hardware fault, got {other:?}"),
        }
        assert_eq!(motor.duty_cycle(), 70.0);

        recorded.inject_fault(false);
        motor.set_duty_cycle(60.0).unwrap();
        assert_eq!(motor.duty_cycle(), 60.0);
    }
}
