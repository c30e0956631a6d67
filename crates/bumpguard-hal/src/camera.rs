//! `FrameSource` trait for image-capture hardware.

use bumpguard_types::{BumpError, Frame};

/// A camera or any other producer of frames on demand.
pub trait FrameSource: Send {
    /// Stable identifier for this source, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next frame.
    ///
    /// Implementations must not block indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`BumpError::CaptureTransient`] when this one frame could not
    /// be produced but a retry may succeed, and [`BumpError::CaptureFatal`]
    /// when the device is unusable.
    fn next_frame(&mut self) -> Result<Frame, BumpError>;

    /// Stop streaming and release the device.  Must tolerate repeated calls.
    fn release(&mut self) -> Result<(), BumpError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimCamera;

    #[test]
    fn frames_are_numbered_and_sized_by_resolution() {
        let mut cam: Box<dyn FrameSource> = Box::new(SimCamera::with_resolution("front_rgb", 4, 2));
        assert_eq!(cam.id(), "front_rgb");

        let first = cam.next_frame().unwrap();
        let second = cam.next_frame().unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 2));
        assert_eq!((second.width, second.height), (4, 2));
        assert_eq!(second.data.len(), 4 * 2 * 3);
        assert!(second.captured_at >= first.captured_at);
    }

    #[test]
    fn transient_failure_is_retryable_and_skips_no_sequence_number() {
        let mut cam: Box<dyn FrameSource> = Box::new(
            SimCamera::with_resolution("front_rgb", 2, 2)
                .fail_at(2, BumpError::CaptureTransient("dropped buffer".into())),
        );
        assert_eq!(cam.next_frame().unwrap().sequence, 1);

        let err = cam.next_frame().unwrap_err();
        assert!(matches!(err, BumpError::CaptureTransient(_)));
        assert!(!err.is_fatal());

        assert_eq!(cam.next_frame().unwrap().sequence, 2);
    }

    #[test]
    fn fatal_failure_persists_and_release_is_repeatable() {
        let sim = SimCamera::with_resolution("front_rgb", 2, 2)
            .fail_from(1, BumpError::CaptureFatal("unplugged".into()));
        let recorded = sim.probe();
        let mut cam: Box<dyn FrameSource> = Box::new(sim);

        for _ in 0..3 {
            assert!(cam.next_frame().unwrap_err().is_fatal());
        }
        assert_eq!(recorded.attempts(), 3);

        cam.release().unwrap();
        cam.release().unwrap();
        assert_eq!(recorded.release_count(), 2);
    }
}
