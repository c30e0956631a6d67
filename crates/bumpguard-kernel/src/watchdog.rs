//! [`Watchdog`] – stalled-component detector.
//!
//! The control loop feeds the watchdog every time the frame source delivers
//! a frame.  When no feed has arrived within the deadline the component is
//! considered stalled, and [`Watchdog::check`] reports
//! [`BumpError::SourceStalled`] so the loop can shut down instead of waiting
//! on a camera that will never answer.

use std::time::{Duration, Instant};

use bumpguard_types::BumpError;
use tracing::error;

/// Health state reported for the watched component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Fed within its deadline.
    Healthy,
    /// Not fed within its deadline.
    TimedOut,
}

/// Deadline tracker for one component.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bumpguard_kernel::watchdog::{ComponentHealth, Watchdog};
///
/// let mut wd = Watchdog::new("front_rgb", Duration::from_secs(1));
/// wd.feed();
/// assert_eq!(wd.health(), ComponentHealth::Healthy);
/// assert!(wd.check().is_ok());
/// ```
#[derive(Debug)]
pub struct Watchdog {
    component: String,
    timeout: Duration,
    last_feed: Instant,
}

impl Watchdog {
    /// Start watching `component`.  The deadline starts counting now.
    pub fn new(component: impl Into<String>, timeout: Duration) -> Self {
        Self {
            component: component.into(),
            timeout,
            last_feed: Instant::now(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Record a sign of life, resetting the deadline.
    pub fn feed(&mut self) {
        self.last_feed = Instant::now();
    }

    /// Time elapsed since the last feed.
    pub fn silence(&self) -> Duration {
        self.last_feed.elapsed()
    }

    pub fn health(&self) -> ComponentHealth {
        if self.silence() <= self.timeout {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::TimedOut
        }
    }

    /// `Err(SourceStalled)` once the deadline has passed.
    pub fn check(&self) -> Result<(), BumpError> {
        match self.health() {
            ComponentHealth::Healthy => Ok(()),
            ComponentHealth::TimedOut => {
                let stalled_ms = u64::try_from(self.silence().as_millis()).unwrap_or(u64::MAX);
                error!(component = %self.component, stalled_ms, "component stalled");
                Err(BumpError::SourceStalled { stalled_ms })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_watchdog_is_healthy() {
        let wd = Watchdog::new("camera", Duration::from_secs(5));
        assert_eq!(wd.health(), ComponentHealth::Healthy);
        assert_eq!(wd.component(), "camera");
    }

    #[test]
    fn feed_resets_deadline() {
        let mut wd = Watchdog::new("camera", Duration::from_millis(200));
        thread::sleep(Duration::from_millis(120));
        wd.feed();
        thread::sleep(Duration::from_millis(120));
        assert!(wd.check().is_ok());
    }

    #[test]
    fn silent_component_times_out() {
        let wd = Watchdog::new("camera", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.health(), ComponentHealth::TimedOut);
        match wd.check() {
            Err(BumpError::SourceStalled { stalled_ms }) => assert!(stalled_ms >= 20),
            other => panic!("expected SourceStalled, got {other:?}"),
        }
    }
}
