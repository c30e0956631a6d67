//! [`ControlLoop`] – the detection-to-actuation orchestrator.
//!
//! Single thread of control, one frame per iteration:
//!
//! 1. **Acquire** – pull the next frame from the [`FrameSource`].  Transient
//!    failures are logged and retried next iteration; the [`Watchdog`]
//!    turns a source that stops delivering into a fatal stall.
//! 2. **Sample** – advance the sampling counter; only every `cadence`-th
//!    frame is inspected.
//! 3. **Detect** – run the [`HazardDetector`] on inspected frames.  A
//!    detector error counts as "no hazard" for that frame (fail-open) and is
//!    escalated after too many in a row.
//! 4. **Debounce** – feed the verdict to the [`HazardDebouncer`].
//! 5. **Act** – on a transition to PRESENT: alert on, then ramp down to the
//!    hazard setpoint.  On a transition to CLEAR: alert off, then ramp back
//!    up to cruise.  Alert toggles always precede the ramp.
//! 6. **Stop check** – a [`StopHandle`] request ends the loop.
//!
//! Ramps block the loop: no frame is acquired while the setpoint moves.  With
//! [`RampMode::Interruptible`] the recovery ramp (toward cruise) instead keeps
//! sampling between steps and yields to a newly debounced hazard or a stop
//! request; ramps toward the hazard setpoint are never interrupted.
//!
//! # Shutdown
//!
//! [`ControlLoop::run`] always finishes with [`ControlLoop::shutdown`]:
//! motors zeroed and released, alert silenced and released, frame source
//! released.  The protocol runs at most once; `Drop` runs it too if `run` was
//! never reached or unwound.
//!
//! # Example
//!
//! ```rust
//! use bumpguard_hal::sim::SimRig;
//! use bumpguard_runtime::{ControlLoop, ControlLoopConfig, ExitReason, HazardWindow, ScriptedDetector};
//!
//! let rig = SimRig::new();
//! let detector = ScriptedDetector::new(vec![HazardWindow { first_frame: 5, last_frame: 5, confidence: 0.6 }]);
//! let config = ControlLoopConfig {
//!     ramp_step_delay: std::time::Duration::ZERO,
//!     frame_limit: Some(10),
//!     ..Default::default()
//! };
//! let mut control = ControlLoop::new(config, rig.bank, rig.alert, Box::new(rig.camera), Box::new(detector)).unwrap();
//! assert_eq!(control.run().unwrap(), ExitReason::FrameLimitReached);
//! assert_eq!(control.transitions().len(), 2);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bumpguard_hal::{ActuatorBank, AlertDevice, FrameSource, MIN_RAMP_STEP_PERCENT, RampOutcome};
use bumpguard_kernel::{FailureStreak, Watchdog};
use bumpguard_types::{BumpError, Frame, HazardCondition, StatusSnapshot, TransitionEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::debounce::{DebounceStrategy, HazardDebouncer};
use crate::detector::{HazardDetector, hazard_seen};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a recovery ramp may be pre-empted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampMode {
    /// Every ramp runs to completion before the next frame is acquired.
    #[default]
    Blocking,
    /// Recovery ramps keep sampling frames between steps and stop early when
    /// the hazard returns or a stop is requested.
    Interruptible,
}

/// Fixed-at-startup parameters of the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlLoopConfig {
    /// Inspect every `cadence`-th frame.
    pub cadence: u64,
    /// Minimum detector confidence (exclusive) that counts as a hazard.
    pub confidence_threshold: f32,
    pub ramp_step_percent: f32,
    pub ramp_step_delay: Duration,
    /// Setpoint while clear.
    pub cruise_percent: f32,
    /// Setpoint while a hazard is present.
    pub hazard_percent: f32,
    pub debounce: DebounceStrategy,
    pub ramp_mode: RampMode,
    /// Longest tolerated gap between two delivered frames.
    pub frame_stall_timeout: Duration,
    /// Detector failures in a row before giving up; `0` never gives up.
    pub max_consecutive_detector_failures: u32,
    /// Transient capture failures in a row before giving up; `0` never
    /// gives up (the stall timeout still applies).
    pub max_consecutive_capture_errors: u32,
    /// Stop normally after this many acquired frames.
    pub frame_limit: Option<u64>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            cadence: 5,
            confidence_threshold: 0.4,
            ramp_step_percent: 10.0,
            ramp_step_delay: Duration::from_millis(200),
            cruise_percent: 100.0,
            hazard_percent: 0.0,
            debounce: DebounceStrategy::SingleSample,
            ramp_mode: RampMode::Blocking,
            frame_stall_timeout: Duration::from_secs(5),
            max_consecutive_detector_failures: 5,
            max_consecutive_capture_errors: 30,
            frame_limit: None,
        }
    }
}

impl ControlLoopConfig {
    /// Reject parameter combinations the loop cannot honour.
    pub fn validate(&self) -> Result<(), BumpError> {
        if self.cadence == 0 {
            return Err(BumpError::Config("cadence must be at least 1".into()));
        }
        if !(self.confidence_threshold > 0.0 && self.confidence_threshold < 1.0) {
            return Err(BumpError::Config(format!(
                "confidence_threshold must lie in (0, 1), got {}",
                self.confidence_threshold
            )));
        }
        if !(self.ramp_step_percent.is_finite() && self.ramp_step_percent >= MIN_RAMP_STEP_PERCENT)
        {
            return Err(BumpError::Config(format!(
                "ramp_step_percent must be at least {MIN_RAMP_STEP_PERCENT}, got {}",
                self.ramp_step_percent
            )));
        }
        let in_range = |p: f32| (0.0..=100.0).contains(&p);
        if !in_range(self.cruise_percent)
            || !in_range(self.hazard_percent)
            || self.hazard_percent >= self.cruise_percent
        {
            return Err(BumpError::Config(format!(
                "need 0 <= hazard_percent ({}) < cruise_percent ({}) <= 100",
                self.hazard_percent, self.cruise_percent
            )));
        }
        if self.frame_stall_timeout.is_zero() {
            return Err(BumpError::Config("frame_stall_timeout must be positive".into()));
        }
        self.debounce.validate()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handles exposed to the surrounding CLI / UI
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable, thread-safe stop request flag.
///
/// The loop checks it once per iteration (and between recovery-ramp steps in
/// [`RampMode::Interruptible`]); it never aborts a blocking ramp midway.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Latest [`StatusSnapshot`], readable from another thread while the loop
/// runs.
#[derive(Debug, Clone)]
pub struct StatusFeed(Arc<Mutex<StatusSnapshot>>);

impl StatusFeed {
    fn new(initial: StatusSnapshot) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn latest(&self) -> StatusSnapshot {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn publish(&self, snapshot: StatusSnapshot) {
        *self.0.lock().unwrap_or_else(|p| p.into_inner()) = snapshot;
    }
}

/// Why [`ControlLoop::run`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// A [`StopHandle`] requested the stop (user quit or interrupt).
    StopRequested,
    /// [`ControlLoopConfig::frame_limit`] frames were acquired.
    FrameLimitReached,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampler: acquisition + cadence + detection
// ─────────────────────────────────────────────────────────────────────────────

/// Everything needed to turn "give me the next frame" into "was a hazard
/// seen on an inspected frame".  Kept apart from the actuators so that an
/// interruptible ramp can keep sampling while the bank is mid-ramp.
struct Sampler {
    source: Box<dyn FrameSource>,
    detector: Box<dyn HazardDetector>,
    cadence: u64,
    confidence_threshold: f32,
    watchdog: Watchdog,
    capture_failures: FailureStreak,
    detector_failures: FailureStreak,
    /// Sampling counter: successfully acquired frames.
    frames_acquired: u64,
    frames_inspected: u64,
}

impl Sampler {
    /// One frame's worth of work.  `Ok(None)` when no verdict was produced
    /// (transient capture failure or a skipped frame).
    fn sample(&mut self) -> Result<Option<bool>, BumpError> {
        match self.acquire()? {
            Some(frame) => self.inspect(&frame),
            None => Ok(None),
        }
    }

    fn acquire(&mut self) -> Result<Option<Frame>, BumpError> {
        match self.source.next_frame() {
            Ok(frame) => {
                self.watchdog.feed();
                self.capture_failures.record_success();
                self.frames_acquired += 1;
                Ok(Some(frame))
            }
            Err(e) if !e.is_fatal() => {
                warn!(source = self.source.id(), error = %e, "frame capture failed; retrying");
                if self.capture_failures.record_failure() {
                    return Err(BumpError::CaptureFatal(format!(
                        "{} consecutive capture failures, last: {e}",
                        self.capture_failures.count()
                    )));
                }
                self.watchdog.check()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn inspect(&mut self, frame: &Frame) -> Result<Option<bool>, BumpError> {
        if self.frames_acquired % self.cadence != 0 {
            return Ok(None);
        }
        self.frames_inspected += 1;

        match self.detector.detect(frame, self.confidence_threshold) {
            Ok(detections) => {
                self.detector_failures.record_success();
                for d in &detections {
                    debug!(
                        frame = self.frames_acquired,
                        label = %d.label,
                        confidence = d.confidence,
                        x1 = d.region.x1,
                        y1 = d.region.y1,
                        x2 = d.region.x2,
                        y2 = d.region.y2,
                        "detection"
                    );
                }
                Ok(Some(hazard_seen(&detections, self.confidence_threshold)))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(
                    frame = self.frames_acquired,
                    error = %e,
                    "hazard detector failed; treating frame as hazard-free"
                );
                if self.detector_failures.record_failure() {
                    return Err(BumpError::DetectorUnavailable {
                        consecutive: self.detector_failures.count(),
                    });
                }
                Ok(Some(false))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ControlLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every hardware handle and drives them from detector output.
pub struct ControlLoop {
    config: ControlLoopConfig,
    bank: ActuatorBank,
    alert: AlertDevice,
    sampler: Sampler,
    debouncer: HazardDebouncer,
    stop: StopHandle,
    feed: StatusFeed,
    transitions: Vec<TransitionEvent>,
    hazard_since: Option<DateTime<Utc>>,
    shut_down: bool,
}

impl ControlLoop {
    /// Assemble a loop from owned hardware handles.
    ///
    /// # Errors
    ///
    /// Returns [`BumpError::Config`] when `config` fails validation.  The
    /// handles are dropped in that case, which stops the bank.
    pub fn new(
        config: ControlLoopConfig,
        bank: ActuatorBank,
        alert: AlertDevice,
        source: Box<dyn FrameSource>,
        detector: Box<dyn HazardDetector>,
    ) -> Result<Self, BumpError> {
        config.validate()?;

        let watchdog = Watchdog::new(source.id(), config.frame_stall_timeout);
        let sampler = Sampler {
            source,
            detector,
            cadence: config.cadence,
            confidence_threshold: config.confidence_threshold,
            watchdog,
            capture_failures: FailureStreak::new("frame_source", config.max_consecutive_capture_errors),
            detector_failures: FailureStreak::new(
                "hazard_detector",
                config.max_consecutive_detector_failures,
            ),
            frames_acquired: 0,
            frames_inspected: 0,
        };
        let debouncer = HazardDebouncer::new(config.debounce);
        let feed = StatusFeed::new(StatusSnapshot {
            condition: HazardCondition::Clear,
            setpoint_percent: bank.setpoint(),
            alert_active: alert.is_active(),
            frames_acquired: 0,
            frames_inspected: 0,
            hazard_since: None,
        });

        Ok(Self {
            config,
            bank,
            alert,
            sampler,
            debouncer,
            stop: StopHandle::new(),
            feed,
            transitions: Vec::new(),
            hazard_since: None,
            shut_down: false,
        })
    }

    /// Replace the internal stop flag with one shared with, e.g., a Ctrl-C
    /// handler.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn status_feed(&self) -> StatusFeed {
        self.feed.clone()
    }

    pub fn condition(&self) -> HazardCondition {
        self.debouncer.condition()
    }

    /// Every transition seen so far, oldest first.
    pub fn transitions(&self) -> &[TransitionEvent] {
        &self.transitions
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            condition: self.debouncer.condition(),
            setpoint_percent: self.bank.setpoint(),
            alert_active: self.alert.is_active(),
            frames_acquired: self.sampler.frames_acquired,
            frames_inspected: self.sampler.frames_inspected,
            hazard_since: self.hazard_since,
        }
    }

    /// Run until a stop is requested, the frame limit is hit, or a fatal
    /// error occurs, then run the shutdown protocol.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the loop, or the first shutdown
    /// failure when the loop itself ended normally.
    #[instrument(skip(self), fields(cadence = self.config.cadence))]
    pub fn run(&mut self) -> Result<ExitReason, BumpError> {
        if self.shut_down {
            return Err(BumpError::Config("control loop has already shut down".into()));
        }

        let outcome = self.run_until_exit();
        let cleanup = self.shutdown();

        match (outcome, cleanup) {
            (Ok(reason), Ok(())) => {
                info!(?reason, "control loop finished");
                Ok(reason)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(fatal), Ok(())) => {
                error!(error = %fatal, "control loop terminated by fatal error");
                Err(fatal)
            }
            (Err(fatal), Err(cleanup_err)) => {
                error!(error = %fatal, cleanup_error = %cleanup_err, "control loop terminated by fatal error; shutdown also failed");
                Err(fatal)
            }
        }
    }

    fn run_until_exit(&mut self) -> Result<ExitReason, BumpError> {
        self.bank.start(self.config.cruise_percent)?;
        self.sampler.watchdog.feed();
        self.publish();
        info!(
            cadence = self.config.cadence,
            threshold = self.config.confidence_threshold,
            channels = ?self.bank.channel_ids(),
            "control loop started"
        );

        loop {
            if self.stop.is_stop_requested() {
                info!("Stopped by user");
                return Ok(ExitReason::StopRequested);
            }
            if let Some(limit) = self.config.frame_limit
                && self.sampler.frames_acquired >= limit
            {
                return Ok(ExitReason::FrameLimitReached);
            }
            self.step()?;
            self.publish();
        }
    }

    /// One loop iteration: acquire, maybe inspect, maybe act.
    fn step(&mut self) -> Result<(), BumpError> {
        let Some(seen) = self.sampler.sample()? else {
            return Ok(());
        };
        match self.debouncer.observe(seen) {
            Some(condition) => self.apply_transition(condition),
            None => Ok(()),
        }
    }

    fn apply_transition(&mut self, mut condition: HazardCondition) -> Result<(), BumpError> {
        loop {
            self.record_transition(condition);
            match condition {
                HazardCondition::Present => {
                    self.alert.activate()?;
                    self.bank.ramp_to(
                        self.config.hazard_percent,
                        self.config.ramp_step_percent,
                        self.config.ramp_step_delay,
                    )?;
                    self.ramp_finished();
                    return Ok(());
                }
                HazardCondition::Clear => {
                    self.alert.deactivate()?;
                    let preempted = self.recover()?;
                    self.ramp_finished();
                    match preempted {
                        Some(next) => condition = next,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// The loop acquires nothing while a blocking ramp runs, so the time
    /// spent ramping must not count as source silence.
    fn ramp_finished(&mut self) {
        self.sampler.watchdog.feed();
    }

    /// Ramp back to cruise.  Returns the condition that pre-empted the ramp,
    /// if any.
    fn recover(&mut self) -> Result<Option<HazardCondition>, BumpError> {
        let (target, step, delay) = (
            self.config.cruise_percent,
            self.config.ramp_step_percent,
            self.config.ramp_step_delay,
        );
        if self.config.ramp_mode == RampMode::Blocking {
            self.bank.ramp_to(target, step, delay)?;
            return Ok(None);
        }

        let Self {
            bank,
            sampler,
            debouncer,
            stop,
            ..
        } = self;
        let mut fault = None;
        let mut preempted = None;
        let outcome = bank.ramp_to_until(target, step, delay, |_| {
            if stop.is_stop_requested() {
                return true;
            }
            match sampler.sample() {
                Ok(Some(seen)) => {
                    preempted = debouncer.observe(seen);
                    preempted.is_some()
                }
                Ok(None) => false,
                Err(e) => {
                    fault = Some(e);
                    true
                }
            }
        })?;

        if let Some(e) = fault {
            return Err(e);
        }
        if let RampOutcome::Interrupted { at } = outcome {
            debug!(at, ?preempted, "recovery ramp pre-empted");
        }
        Ok(preempted)
    }

    fn record_transition(&mut self, condition: HazardCondition) {
        let event = TransitionEvent {
            frame: self.sampler.frames_acquired,
            condition,
            at: Utc::now(),
        };
        match condition {
            HazardCondition::Present => self.hazard_since = Some(event.at),
            HazardCondition::Clear => self.hazard_since = None,
        }
        info!(frame = event.frame, condition = %condition, "hazard transition");
        self.transitions.push(event);
        self.publish();
    }

    fn publish(&self) {
        self.feed.publish(self.status());
    }

    /// Stop the motors, silence and release the alert, release the frame
    /// source.  Runs at most once; later calls return `Ok(())`.
    ///
    /// Every step is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub fn shutdown(&mut self) -> Result<(), BumpError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        info!("running shutdown protocol");

        let steps = [
            ("actuator_bank", self.bank.stop()),
            ("alert", self.alert.release()),
            ("frame_source", self.sampler.source.release()),
        ];
        let mut first_err = None;
        for (component, result) in steps {
            if let Err(e) = result {
                error!(component, error = %e, "shutdown step failed");
                first_err.get_or_insert(e);
            }
        }
        self.publish();

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(error = %e, "shutdown on drop failed");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
