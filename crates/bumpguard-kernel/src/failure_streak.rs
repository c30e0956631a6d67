//! [`FailureStreak`] – consecutive-failure escalation.
//!
//! Per-frame failures are tolerated one at a time, but a run of them means
//! the collaborator is effectively gone.  The streak counts consecutive
//! failures, resets on the first success, and reports escalation once the
//! count reaches its limit.
//!
//! ```rust
//! use bumpguard_kernel::FailureStreak;
//!
//! let mut streak = FailureStreak::new("detector", 3);
//! assert!(!streak.record_failure());
//! assert!(!streak.record_failure());
//! assert!(streak.record_failure()); // third in a row → escalate
//!
//! streak.record_success();
//! assert_eq!(streak.count(), 0);
//! ```

use tracing::warn;

/// Counts consecutive failures of one collaborator.
#[derive(Debug, Clone)]
pub struct FailureStreak {
    name: &'static str,
    /// Failures in a row that trigger escalation; `0` never escalates.
    limit: u32,
    count: u32,
}

impl FailureStreak {
    pub fn new(name: &'static str, limit: u32) -> Self {
        Self {
            name,
            limit,
            count: 0,
        }
    }

    /// Record one failure.  Returns `true` when the streak has reached the
    /// limit and the caller should treat the collaborator as unusable.
    pub fn record_failure(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        let escalate = self.limit > 0 && self.count >= self.limit;
        if escalate {
            warn!(collaborator = self.name, consecutive = self.count, "failure streak reached limit");
        }
        escalate
    }

    /// Record a success, ending the current streak.
    pub fn record_success(&mut self) {
        self.count = 0;
    }

    /// Current number of consecutive failures.
    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_at_limit() {
        let mut streak = FailureStreak::new("detector", 2);
        assert!(!streak.record_failure());
        assert!(streak.record_failure());
        assert!(streak.record_failure()); // stays escalated
        assert_eq!(streak.count(), 3);
    }

    #[test]
    fn success_breaks_streak() {
        let mut streak = FailureStreak::new("camera", 3);
        streak.record_failure();
        streak.record_failure();
        streak.record_success();
        assert!(!streak.record_failure());
        assert_eq!(streak.count(), 1);
    }

    #[test]
    fn zero_limit_never_escalates() {
        let mut streak = FailureStreak::new("detector", 0);
        for _ in 0..100 {
            assert!(!streak.record_failure());
        }
    }

    #[test]
    fn limit_one_escalates_immediately() {
        let mut streak = FailureStreak::new("detector", 1);
        assert!(streak.record_failure());
    }
}
