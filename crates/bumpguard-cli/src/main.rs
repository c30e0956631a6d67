//! `bumpguard` – command-line entry point.
//!
//! 1. Loads `~/.bumpguard/config.toml` (or `--config PATH`), applying
//!    `BUMPGUARD_*` overrides; defaults are used when the file is absent.
//! 2. Wires the simulated rig: four motors, the buzzer and a camera, with
//!    identifiers taken from the `[pins]` section.
//! 3. Runs the control loop against the `[sim]` hazard schedule until the
//!    frame budget is used up or Ctrl-C is pressed.
//! 4. Prints every hazard transition and the final status.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use bumpguard_hal::sim::{SimCamera, SimRig};
use bumpguard_runtime::{ControlLoop, ExitReason, ScriptedDetector, StopHandle, init_tracing};
use bumpguard_types::{HazardCondition, StatusSnapshot};
use clap::Parser;
use colored::Colorize;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about = "Speed-bump hazard controller (simulated rig)")]
struct Args {
    /// Read configuration from this file instead of ~/.bumpguard/config.toml
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write a default configuration file and exit
    #[arg(long, default_value_t = false)]
    write_default: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = init_tracing("bumpguard");

    print_banner();

    let path = args.config.unwrap_or_else(config::config_path);

    if args.write_default {
        return match config::save_to(&config::Config::default(), &path) {
            Ok(()) => {
                println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults (run with {} to create one).",
                path.display().to_string().dimmed(),
                "--write-default".bold()
            );
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = cfg.pins.validate() {
        println!("{}: {}", "Pin map error".red(), e);
        return ExitCode::FAILURE;
    }
    info!(
        motors = ?cfg.pins.motors,
        alert = cfg.pins.alert,
        pwm_frequency_hz = cfg.pins.pwm_frequency_hz,
        "hardware pin map"
    );

    // ── Simulated rig ─────────────────────────────────────────────────────
    let camera = SimCamera::new("front_rgb")
        .with_capture_delay(Duration::from_millis(cfg.sim.frame_interval_ms));
    let rig = SimRig::from_pins(&cfg.pins).with_camera(camera);
    let detector = ScriptedDetector::new(cfg.sim.hazard_windows.clone());

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = StopHandle::new();
    let stop_on_signal = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping motors …".yellow().bold());
        stop_on_signal.request_stop();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the run can only end at the frame limit");
    }

    let mut control = match ControlLoop::new(
        cfg.to_loop_config(),
        rig.bank,
        rig.alert,
        Box::new(rig.camera),
        Box::new(detector),
    ) {
        Ok(control) => control.with_stop_handle(stop),
        Err(e) => {
            println!("{}: {}", "Invalid control settings".red(), e);
            return ExitCode::FAILURE;
        }
    };

    println!();
    println!(
        "  Running: cadence {}, threshold {}, {} frame(s) budget.  Press {} to stop.\n",
        cfg.control.cadence.to_string().bold(),
        cfg.control.confidence_threshold.to_string().bold(),
        match cfg.sim.max_frames {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        },
        "Ctrl-C".bold().cyan()
    );

    let result = control.run();

    println!();
    for t in control.transitions() {
        let label = match t.condition {
            HazardCondition::Present => "PRESENT".red().bold(),
            HazardCondition::Clear => "CLEAR".green().bold(),
        };
        println!(
            "  frame {:>6}  {}  {}",
            t.frame,
            label,
            t.at.format("%H:%M:%S%.3f").to_string().dimmed()
        );
    }
    print_status(&control.status());

    match result {
        Ok(ExitReason::StopRequested) => {
            println!("  {} Stopped by user; motors released.", "✓".green().bold());
            ExitCode::SUCCESS
        }
        Ok(ExitReason::FrameLimitReached) => {
            println!("  {} Frame budget used up; motors released.", "✓".green().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("  {} {}", "Controller halted:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn print_status(status: &StatusSnapshot) {
    println!();
    println!("  Condition       : {}", status.condition.to_string().bold());
    println!("  Setpoint        : {:.0}%", status.setpoint_percent);
    println!(
        "  Alert           : {}",
        if status.alert_active { "on" } else { "off" }
    );
    println!(
        "  Frames          : {} acquired, {} inspected",
        status.frames_acquired, status.frames_inspected
    );
    if let Some(since) = status.hazard_since {
        println!("  Hazard since    : {}", since.to_rfc3339());
    }
    println!();
}

fn print_banner() {
    println!();
    println!("{}", r#"   __                                             __"#.bold().cyan());
    println!("{}", r#"  / /  __ ____ _  ___ ___ ___ _____ ________ ____/ /"#.bold().cyan());
    println!("{}", r#" / _ \/ // /  ' \/ _ / _ `/ // / _ `/ __/ _  / _  / "#.bold().cyan());
    println!("{}", r#"/_.__/\_,_/_/_/_/ .__\_, /\_,_/\_,_/_/  \_,_/\_,_/  "#.bold().cyan());
    println!("{}", r#"               /_/  /___/                            "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "bumpguard".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Speed-bump hazard controller");
    println!();
}
