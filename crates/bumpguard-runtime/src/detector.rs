//! Hazard detection seam.
//!
//! The inference engine is opaque to the controller: given a frame and a
//! confidence threshold it returns zero or more [`Detection`]s.  The loop
//! reduces them to one boolean per inspected frame with [`hazard_seen`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bumpguard_types::{BoundingBox, BumpError, Detection, Frame};
use serde::{Deserialize, Serialize};

/// Class label of the single hazard the model knows about.
pub const HAZARD_LABEL: &str = "speed-bump";

/// An inference engine that finds hazards in a frame.
pub trait HazardDetector: Send {
    /// Run inference on `frame`, returning detections at or above
    /// `confidence_threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`BumpError::Inference`] when the model cannot produce a
    /// result for this frame.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32)
    -> Result<Vec<Detection>, BumpError>;
}

impl<F> HazardDetector for F
where
    F: FnMut(&Frame, f32) -> Result<Vec<Detection>, BumpError> + Send,
{
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, BumpError> {
        self(frame, confidence_threshold)
    }
}

/// `true` iff at least one detection is strictly above `threshold`.
pub fn hazard_seen(detections: &[Detection], threshold: f32) -> bool {
    detections.iter().any(|d| d.exceeds(threshold))
}

/// An inclusive range of frame sequence numbers during which the scripted
/// hazard is visible at `confidence`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HazardWindow {
    pub first_frame: u64,
    pub last_frame: u64,
    pub confidence: f32,
}

impl HazardWindow {
    pub fn contains(&self, sequence: u64) -> bool {
        (self.first_frame..=self.last_frame).contains(&sequence)
    }
}

/// Detector that replays a fixed schedule instead of running a model.
///
/// Like a real model invoked with a confidence cut-off, it drops detections
/// below the requested threshold (inclusive at the threshold itself).  Call
/// numbers are 1-based; [`fail_at`][Self::fail_at] and
/// [`fail_from`][Self::fail_from] script inference errors.
pub struct ScriptedDetector {
    windows: Vec<HazardWindow>,
    one_off: HashMap<u64, String>,
    from: Option<(u64, String)>,
    calls: Arc<Mutex<Vec<u64>>>,
}

impl ScriptedDetector {
    pub fn new(windows: Vec<HazardWindow>) -> Self {
        Self {
            windows,
            one_off: HashMap::new(),
            from: None,
            calls: Arc::default(),
        }
    }

    /// Fail call number `call` with an inference error.
    pub fn fail_at(mut self, call: u64, reason: impl Into<String>) -> Self {
        self.one_off.insert(call, reason.into());
        self
    }

    /// Fail every call from `call` onward.
    pub fn fail_from(mut self, call: u64, reason: impl Into<String>) -> Self {
        self.from = Some((call, reason.into()));
        self
    }

    /// Shared list of frame sequence numbers the detector was invoked on.
    pub fn calls(&self) -> Arc<Mutex<Vec<u64>>> {
        self.calls.clone()
    }

    fn region_for(frame: &Frame) -> BoundingBox {
        // Lower-middle band of the image, where a bump sits in a road view.
        let (w, h) = (frame.width as f32, frame.height as f32);
        BoundingBox::new(w * 0.25, h * 0.6, w * 0.75, h * 0.8)
    }
}

impl HazardDetector for ScriptedDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>, BumpError> {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
            calls.push(frame.sequence);
            calls.len() as u64
        };
        if let Some(reason) = self.one_off.remove(&call) {
            return Err(BumpError::Inference(reason));
        }
        if let Some((start, reason)) = &self.from
            && call >= *start
        {
            return Err(BumpError::Inference(reason.clone()));
        }

        Ok(self
            .windows
            .iter()
            .filter(|w| w.contains(frame.sequence) && w.confidence >= confidence_threshold)
            .map(|w| Detection {
                label: HAZARD_LABEL.to_string(),
                confidence: w.confidence,
                region: Self::region_for(frame),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn frame(sequence: u64) -> Frame {
        Frame {
            width: 640,
            height: 480,
            data: Vec::new(),
            sequence,
            captured_at: Utc::now(),
        }
    }

    fn det(confidence: f32) -> Detection {
        Detection {
            label: HAZARD_LABEL.to_string(),
            confidence,
            region: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    #[test]
    fn hazard_seen_requires_one_detection_above_threshold() {
        assert!(!hazard_seen(&[], 0.4));
        assert!(!hazard_seen(&[det(0.2), det(0.4)], 0.4));
        assert!(hazard_seen(&[det(0.2), det(0.41)], 0.4));
    }

    #[test]
    fn scripted_detector_follows_windows() {
        let mut detector = ScriptedDetector::new(vec![HazardWindow {
            first_frame: 5,
            last_frame: 7,
            confidence: 0.6,
        }]);
        assert!(detector.detect(&frame(4), 0.4).unwrap().is_empty());
        let found = detector.detect(&frame(5), 0.4).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "speed-bump");
        assert!((found[0].confidence - 0.6).abs() < f32::EPSILON);
        assert!(found[0].region.width() > 0.0);
        assert!(detector.detect(&frame(8), 0.4).unwrap().is_empty());
        assert_eq!(*detector.calls().lock().unwrap(), vec![4, 5, 8]);
    }

    #[test]
    fn scripted_detector_applies_model_cutoff() {
        let mut detector = ScriptedDetector::new(vec![HazardWindow {
            first_frame: 1,
            last_frame: 1,
            confidence: 0.3,
        }]);
        assert!(detector.detect(&frame(1), 0.4).unwrap().is_empty());
    }

    #[test]
    fn scripted_detector_failures() {
        let mut detector = ScriptedDetector::new(Vec::new())
            .fail_at(1, "warming up")
            .fail_from(3, "gpu lost");
        assert!(matches!(detector.detect(&frame(1), 0.4), Err(BumpError::Inference(_))));
        assert!(detector.detect(&frame(2), 0.4).is_ok());
        assert!(detector.detect(&frame(3), 0.4).is_err());
        assert!(detector.detect(&frame(4), 0.4).is_err());
    }

    #[test]
    fn closures_are_detectors() {
        let mut detector = |f: &Frame, _t: f32| -> Result<Vec<Detection>, BumpError> {
            Ok(if f.sequence % 2 == 0 { vec![det(0.9)] } else { Vec::new() })
        };
        assert!(detector.detect(&frame(1), 0.4).unwrap().is_empty());
        assert_eq!(detector.detect(&frame(2), 0.4).unwrap().len(), 1);
    }

    #[test]
    fn hazard_window_deserializes_from_toml() {
        let w: HazardWindow =
            toml::from_str("first_frame = 10\nlast_frame = 20\nconfidence = 0.7").unwrap();
        assert!(w.contains(10) && w.contains(20) && !w.contains(21));
    }
}
