//! Hardware channel identifiers of the rig.
//!
//! The controller never interprets these numbers; they are handed to the
//! drivers and written to the log so an operator can match a fault to a
//! wire.  Defaults are the BCM numbering of the reference vehicle.

use std::collections::HashSet;

use bumpguard_types::BumpError;
use serde::{Deserialize, Serialize};

use crate::bank::MOTOR_COUNT;

/// Pins for one drive motor: an H-bridge direction pair plus the PWM enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorPins {
    pub forward: u8,
    pub reverse: u8,
    pub enable: u8,
}

impl MotorPins {
    pub const fn new(forward: u8, reverse: u8, enable: u8) -> Self {
        Self {
            forward,
            reverse,
            enable,
        }
    }
}

/// All channel identifiers used by the vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwarePins {
    #[serde(default = "default_motors")]
    pub motors: [MotorPins; MOTOR_COUNT],
    #[serde(default = "default_alert")]
    pub alert: u8,
    #[serde(default = "default_pwm_frequency_hz")]
    pub pwm_frequency_hz: u32,
}

fn default_motors() -> [MotorPins; MOTOR_COUNT] {
    [
        MotorPins::new(23, 24, 12),
        MotorPins::new(25, 26, 13),
        MotorPins::new(5, 6, 18),
        MotorPins::new(16, 20, 19),
    ]
}
fn default_alert() -> u8 {
    17
}
fn default_pwm_frequency_hz() -> u32 {
    1000
}

impl Default for HardwarePins {
    fn default() -> Self {
        Self {
            motors: default_motors(),
            alert: default_alert(),
            pwm_frequency_hz: default_pwm_frequency_hz(),
        }
    }
}

impl HardwarePins {
    /// Driver identifiers for the motors in wiring order, e.g. `"motor_1@bcm12"`.
    pub fn motor_ids(&self) -> [String; MOTOR_COUNT] {
        let mut number = 0;
        self.motors.map(|m| {
            number += 1;
            format!("motor_{number}@bcm{}", m.enable)
        })
    }

    /// Driver identifier for the alert line, e.g. `"buzzer@bcm17"`.
    pub fn alert_id(&self) -> String {
        format!("buzzer@bcm{}", self.alert)
    }

    /// Reject configurations that assign one pin to two functions.
    pub fn validate(&self) -> Result<(), BumpError> {
        if self.pwm_frequency_hz == 0 {
            return Err(BumpError::Config("pwm_frequency_hz must be positive".into()));
        }
        let mut seen = HashSet::new();
        let all = self
            .motors
            .iter()
            .flat_map(|m| [m.forward, m.reverse, m.enable])
            .chain(std::iter::once(self.alert));
        for pin in all {
            if !seen.insert(pin) {
                return Err(BumpError::Config(format!("pin {pin} is assigned twice")));
            }
        }
        Ok(())
    }
}
