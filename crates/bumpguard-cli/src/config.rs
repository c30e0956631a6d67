//! Configuration vault – reads/writes `~/.bumpguard/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bumpguard_hal::HardwarePins;
use bumpguard_runtime::{ControlLoopConfig, DebounceStrategy, HazardWindow, RampMode};
use serde::{Deserialize, Serialize};

/// Persisted user configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub control: ControlSection,
    #[serde(default)]
    pub pins: HardwarePins,
    #[serde(default)]
    pub sim: SimSection,
}

/// `[control]` – tuning of the detection-to-actuation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSection {
    #[serde(default = "default_cadence")]
    pub cadence: u64,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_ramp_step")]
    pub ramp_step_percent: f32,
    #[serde(default = "default_ramp_delay_ms")]
    pub ramp_step_delay_ms: u64,
    #[serde(default = "default_cruise")]
    pub cruise_percent: f32,
    #[serde(default)]
    pub hazard_percent: f32,
    #[serde(default)]
    pub debounce: DebounceStrategy,
    #[serde(default)]
    pub ramp_mode: RampMode,
    #[serde(default = "default_stall_timeout_ms")]
    pub frame_stall_timeout_ms: u64,
    #[serde(default = "default_detector_failures")]
    pub max_consecutive_detector_failures: u32,
    #[serde(default = "default_capture_errors")]
    pub max_consecutive_capture_errors: u32,
}

/// `[sim]` – the simulated camera and scripted hazard schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSection {
    /// Time the simulated camera takes per frame.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Stop after this many frames; `0` runs until Ctrl-C.
    #[serde(default = "default_max_frames")]
    pub max_frames: u64,
    #[serde(default = "default_hazard_windows")]
    pub hazard_windows: Vec<HazardWindow>,
}

fn default_cadence() -> u64 {
    5
}
fn default_confidence() -> f32 {
    0.4
}
fn default_ramp_step() -> f32 {
    10.0
}
fn default_ramp_delay_ms() -> u64 {
    200
}
fn default_cruise() -> f32 {
    100.0
}
fn default_stall_timeout_ms() -> u64 {
    5_000
}
fn default_detector_failures() -> u32 {
    5
}
fn default_capture_errors() -> u32 {
    30
}
fn default_frame_interval_ms() -> u64 {
    33
}
fn default_max_frames() -> u64 {
    300
}
fn default_hazard_windows() -> Vec<HazardWindow> {
    vec![
        HazardWindow {
            first_frame: 60,
            last_frame: 90,
            confidence: 0.72,
        },
        HazardWindow {
            first_frame: 200,
            last_frame: 215,
            confidence: 0.55,
        },
    ]
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            cadence: default_cadence(),
            confidence_threshold: default_confidence(),
            ramp_step_percent: default_ramp_step(),
            ramp_step_delay_ms: default_ramp_delay_ms(),
            cruise_percent: default_cruise(),
            hazard_percent: 0.0,
            debounce: DebounceStrategy::default(),
            ramp_mode: RampMode::default(),
            frame_stall_timeout_ms: default_stall_timeout_ms(),
            max_consecutive_detector_failures: default_detector_failures(),
            max_consecutive_capture_errors: default_capture_errors(),
        }
    }
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            max_frames: default_max_frames(),
            hazard_windows: default_hazard_windows(),
        }
    }
}

impl Config {
    /// Loop parameters for a simulated run of this configuration.
    pub fn to_loop_config(&self) -> ControlLoopConfig {
        let c = &self.control;
        ControlLoopConfig {
            cadence: c.cadence,
            confidence_threshold: c.confidence_threshold,
            ramp_step_percent: c.ramp_step_percent,
            ramp_step_delay: Duration::from_millis(c.ramp_step_delay_ms),
            cruise_percent: c.cruise_percent,
            hazard_percent: c.hazard_percent,
            debounce: c.debounce,
            ramp_mode: c.ramp_mode,
            frame_stall_timeout: Duration::from_millis(c.frame_stall_timeout_ms),
            max_consecutive_detector_failures: c.max_consecutive_detector_failures,
            max_consecutive_capture_errors: c.max_consecutive_capture_errors,
            frame_limit: (self.sim.max_frames > 0).then_some(self.sim.max_frames),
        }
    }
}

/// Return the path to `~/.bumpguard/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".bumpguard").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `BUMPGUARD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `BUMPGUARD_CADENCE` | `control.cadence` |
/// | `BUMPGUARD_CONFIDENCE` | `control.confidence_threshold` |
/// | `BUMPGUARD_RAMP_DELAY_MS` | `control.ramp_step_delay_ms` |
/// | `BUMPGUARD_MAX_FRAMES` | `sim.max_frames` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("BUMPGUARD_CADENCE")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.control.cadence = n;
    }
    if let Ok(v) = std::env::var("BUMPGUARD_CONFIDENCE")
        && let Ok(t) = v.parse::<f32>()
    {
        cfg.control.confidence_threshold = t;
    }
    if let Ok(v) = std::env::var("BUMPGUARD_RAMP_DELAY_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.control.ramp_step_delay_ms = ms;
    }
    if let Ok(v) = std::env::var("BUMPGUARD_MAX_FRAMES")
        && let Ok(n) = v.parse::<u64>()
    {
        cfg.sim.max_frames = n;
    }
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_loop_defaults() {
        let cfg = Config {
            sim: SimSection {
                max_frames: 0,
                ..SimSection::default()
            },
            ..Config::default()
        };
        assert_eq!(cfg.to_loop_config(), ControlLoopConfig::default());
    }

    #[test]
    fn max_frames_becomes_frame_limit() {
        let cfg = Config::default();
        assert_eq!(cfg.to_loop_config().frame_limit, Some(300));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [control]
            cadence = 3
            ramp_mode = "interruptible"
            debounce = { strategy = "majority_vote", window = 5 }

            [sim]
            max_frames = 50
            "#,
        )
        .unwrap();
        assert_eq!(cfg.control.cadence, 3);
        assert_eq!(cfg.control.ramp_mode, RampMode::Interruptible);
        assert_eq!(cfg.control.debounce, DebounceStrategy::MajorityVote { window: 5 });
        assert_eq!(cfg.control.ramp_step_delay_ms, 200);
        assert_eq!(cfg.sim.max_frames, 50);
        assert_eq!(cfg.sim.hazard_windows, default_hazard_windows());
        assert_eq!(cfg.pins, HardwarePins::default());
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        // Fields without an env override; the others may be changed by the
        // override tests running alongside.
        assert_eq!(loaded.control.debounce, DebounceStrategy::SingleSample);
        assert_eq!(loaded.control.ramp_mode, RampMode::Blocking);
        assert_eq!(loaded.control.cruise_percent, 100.0);
        assert_eq!(loaded.sim.frame_interval_ms, 33);
        assert_eq!(loaded.pins, HardwarePins::default());
        assert_eq!(loaded.sim.hazard_windows.len(), 2);
    }

    #[test]
    fn config_path_points_to_bumpguard_dir() {
        let p = config_path_for_home("/home/driver");
        assert!(p.to_string_lossy().contains(".bumpguard"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[control]\ncadence = \"often\"\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    // Env-var tests each use their own variable so they can run in parallel.

    #[test]
    fn apply_env_overrides_changes_cadence() {
        // SAFETY: only this test reads or writes BUMPGUARD_CADENCE.
        unsafe { std::env::set_var("BUMPGUARD_CADENCE", "10") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control.cadence, 10);
        unsafe { std::env::remove_var("BUMPGUARD_CADENCE") };
    }

    #[test]
    fn apply_env_overrides_changes_confidence() {
        // SAFETY: only this test reads or writes BUMPGUARD_CONFIDENCE.
        unsafe { std::env::set_var("BUMPGUARD_CONFIDENCE", "0.65") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.control.confidence_threshold - 0.65).abs() < f32::EPSILON);
        unsafe { std::env::remove_var("BUMPGUARD_CONFIDENCE") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_delay() {
        // SAFETY: only this test reads or writes BUMPGUARD_RAMP_DELAY_MS.
        unsafe { std::env::set_var("BUMPGUARD_RAMP_DELAY_MS", "fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control.ramp_step_delay_ms, 200);
        unsafe { std::env::remove_var("BUMPGUARD_RAMP_DELAY_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_max_frames() {
        // SAFETY: only this test reads or writes BUMPGUARD_MAX_FRAMES.
        unsafe { std::env::set_var("BUMPGUARD_MAX_FRAMES", "0") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.sim.max_frames, 0);
        assert_eq!(cfg.to_loop_config().frame_limit, None);
        unsafe { std::env::remove_var("BUMPGUARD_MAX_FRAMES") };
    }
}
