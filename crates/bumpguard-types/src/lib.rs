use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Debounced, process-wide hazard state.
///
/// Only transitions between the two variants drive the actuators and the
/// alert; re-affirming the current variant is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardCondition {
    /// No hazard ahead: cruise, alert silent.
    #[default]
    Clear,
    /// Hazard ahead: stopped, alert sounding.
    Present,
}

impl HazardCondition {
    pub fn is_present(self) -> bool {
        matches!(self, HazardCondition::Present)
    }
}

impl fmt::Display for HazardCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HazardCondition::Clear => write!(f, "clear"),
            HazardCondition::Present => write!(f, "present"),
        }
    }
}

/// Axis-aligned bounding rectangle in image pixel coordinates
/// (top-left `x1,y1`, bottom-right `x2,y2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

/// One hazard instance reported by the detector for a single inspected frame.
///
/// Ephemeral: it is reduced to a per-frame boolean and then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label, e.g. `"speed-bump"`.
    pub label: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    pub region: BoundingBox,
}

impl Detection {
    /// `true` when the confidence is strictly above `threshold`.
    pub fn exceeds(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }
}

/// A captured camera image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data (RGB24 for the road camera).
    pub data: Vec<u8>,
    /// Per-source sequence number, starting at 1.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

/// Record of a debounced hazard transition, kept for telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// Sampling-counter value of the inspected frame that caused it.
    pub frame: u64,
    pub condition: HazardCondition,
    pub at: DateTime<Utc>,
}

/// Point-in-time view of the controller for display and telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub condition: HazardCondition,
    pub setpoint_percent: f32,
    pub alert_active: bool,
    pub frames_acquired: u64,
    pub frames_inspected: u64,
    /// When the current hazard was first seen; `None` while clear.
    pub hazard_since: Option<DateTime<Utc>>,
}

/// Global error type spanning hardware faults, capture failures, inference
/// failures and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BumpError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Frame capture failed: {0}")]
    CaptureTransient(String),

    #[error("Frame source unusable: {0}")]
    CaptureFatal(String),

    #[error("Frame source stalled: no frame for {stalled_ms} ms")]
    SourceStalled { stalled_ms: u64 },

    #[error("Hazard detector error: {0}")]
    Inference(String),

    #[error("Hazard detector unavailable after {consecutive} consecutive failures")]
    DetectorUnavailable { consecutive: u32 },

    #[error("Configuration Error: {0}")]
    Config(String),
}

impl BumpError {
    /// Shorthand for a [`BumpError::HardwareFault`].
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        BumpError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    /// Whether this error must terminate the control loop.
    ///
    /// Transient capture errors and single inference failures are handled
    /// inside one loop iteration; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BumpError::CaptureTransient(_) | BumpError::Inference(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hazard_condition_defaults_to_clear() {
        assert_eq!(HazardCondition::default(), HazardCondition::Clear);
        assert!(!HazardCondition::Clear.is_present());
        assert!(HazardCondition::Present.is_present());
    }

    #[test]
    fn hazard_condition_serializes_lowercase() {
        let json = serde_json::to_string(&HazardCondition::Present).unwrap();
        assert_eq!(json, "\"present\"");
        assert_eq!(HazardCondition::Clear.to_string(), "clear");
    }

    #[test]
    fn detection_threshold_is_strict() {
        let det = Detection {
            label: "speed-bump".to_string(),
            confidence: 0.4,
            region: BoundingBox::new(10.0, 20.0, 110.0, 60.0),
        };
        assert!(!det.exceeds(0.4));
        assert!(det.exceeds(0.39));
    }

    #[test]
    fn bounding_box_dimensions() {
        let b = BoundingBox::new(10.0, 20.0, 110.0, 60.0);
        assert!((b.width() - 100.0).abs() < f32::EPSILON);
        assert!((b.height() - 40.0).abs() < f32::EPSILON);

        let inverted = BoundingBox::new(50.0, 50.0, 40.0, 40.0);
        assert_eq!(inverted.width(), 0.0);
    }

    #[test]
    fn error_fatality_classification() {
        assert!(!BumpError::CaptureTransient("busy".into()).is_fatal());
        assert!(!BumpError::Inference("nan output".into()).is_fatal());
        assert!(BumpError::CaptureFatal("unplugged".into()).is_fatal());
        assert!(BumpError::SourceStalled { stalled_ms: 5000 }.is_fatal());
        assert!(BumpError::DetectorUnavailable { consecutive: 5 }.is_fatal());
        assert!(BumpError::hardware("motor_1", "pwm lost").is_fatal());
    }

    #[test]
    fn error_display() {
        let err = BumpError::hardware("alert", "pin busy");
        assert!(err.to_string().contains("alert"));
        assert!(err.to_string().contains("pin busy"));
    }
}
