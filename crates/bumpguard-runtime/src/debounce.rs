//! [`HazardDebouncer`] – per-frame evidence to stable hazard state.
//!
//! Only inspected frames are fed in; skipped frames never reach the
//! debouncer, so flicker suppression comes mostly from the sampling cadence.
//!
//! # Strategies
//!
//! - [`DebounceStrategy::SingleSample`] (default): the most recent inspected
//!   frame decides.  A disagreeing frame flips the condition immediately.
//! - [`DebounceStrategy::MajorityVote`]: the condition flips only once a
//!   strict majority of the last `window` inspected frames disagrees with it.
//!   This delays both the stop and the recovery by up to `window / 2 + 1`
//!   inspected frames and is therefore an explicit opt-in.
//!
//! ```rust
//! use bumpguard_runtime::debounce::{DebounceStrategy, HazardDebouncer};
//! use bumpguard_types::HazardCondition;
//!
//! let mut d = HazardDebouncer::new(DebounceStrategy::SingleSample);
//! assert_eq!(d.observe(true), Some(HazardCondition::Present));
//! assert_eq!(d.observe(true), None);
//! assert_eq!(d.observe(false), Some(HazardCondition::Clear));
//! ```

use std::collections::VecDeque;

use bumpguard_types::{BumpError, HazardCondition};
use serde::{Deserialize, Serialize};

/// How inspected-frame booleans are aggregated before committing a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DebounceStrategy {
    #[default]
    SingleSample,
    /// Rolling majority over the last `window` inspected frames (odd, ≥ 1).
    MajorityVote { window: usize },
}

impl DebounceStrategy {
    pub fn validate(&self) -> Result<(), BumpError> {
        match *self {
            DebounceStrategy::SingleSample => Ok(()),
            DebounceStrategy::MajorityVote { window } if window == 0 || window % 2 == 0 => {
                Err(BumpError::Config(format!(
                    "majority vote window must be odd and positive, got {window}"
                )))
            }
            DebounceStrategy::MajorityVote { .. } => Ok(()),
        }
    }
}

/// Two-state debouncer over inspected frames.  Starts [`HazardCondition::Clear`].
#[derive(Debug, Clone)]
pub struct HazardDebouncer {
    strategy: DebounceStrategy,
    condition: HazardCondition,
    votes: VecDeque<bool>,
}

impl HazardDebouncer {
    pub fn new(strategy: DebounceStrategy) -> Self {
        let capacity = match strategy {
            DebounceStrategy::SingleSample => 1,
            DebounceStrategy::MajorityVote { window } => window,
        };
        Self {
            strategy,
            condition: HazardCondition::Clear,
            votes: VecDeque::with_capacity(capacity),
        }
    }

    pub fn condition(&self) -> HazardCondition {
        self.condition
    }

    pub fn strategy(&self) -> DebounceStrategy {
        self.strategy
    }

    /// Feed one inspected frame's verdict.  Returns the new condition when
    /// this frame caused a transition, `None` otherwise.
    pub fn observe(&mut self, hazard_seen: bool) -> Option<HazardCondition> {
        let next = match self.strategy {
            DebounceStrategy::SingleSample => Self::from_bool(hazard_seen),
            DebounceStrategy::MajorityVote { window } => self.vote(hazard_seen, window),
        };
        if next == self.condition {
            return None;
        }
        self.condition = next;
        Some(next)
    }

    fn vote(&mut self, hazard_seen: bool, window: usize) -> HazardCondition {
        self.votes.push_back(hazard_seen);
        while self.votes.len() > window {
            self.votes.pop_front();
        }
        let quorum = window / 2 + 1;
        let present = self.votes.iter().filter(|&&v| v).count();
        let clear = self.votes.len() - present;
        if present >= quorum {
            HazardCondition::Present
        } else if clear >= quorum {
            HazardCondition::Clear
        } else {
            self.condition
        }
    }

    fn from_bool(hazard_seen: bool) -> HazardCondition {
        if hazard_seen {
            HazardCondition::Present
        } else {
            HazardCondition::Clear
        }
    }
}
