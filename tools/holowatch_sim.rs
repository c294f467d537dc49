// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Holowatch simulator.
//!
//! Runs the full display core against the simulated platform on a manual
//! clock: one frame cycle and one watchdog check per frame period, with an
//! optional fault injected halfway through. Prints the final status report
//! as JSON.

use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use holowatch::config::{apply_environment_overrides, load_config, HolowatchConfig};
use holowatch::frame_engine::{CycleOutcome, DeviceSet, DisplayCore};
use holowatch::hal::simulated::{SimClock, SimHandles, SimSettings, SimulatedPlatform};
use holowatch::hal::TimeProvider;
use holowatch::observability::{
    debug_flags_help, init_console_logging, parse_debug_flags, ObservabilityConfig,
};
use holowatch::structures::HologramTarget;
use ndarray::Array2;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Nominal,
    Overheat,
    Tracking,
    Skew,
    PowerLoss,
}

impl Scenario {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "nominal" => Some(Self::Nominal),
            "overheat" => Some(Self::Overheat),
            "tracking" => Some(Self::Tracking),
            "skew" => Some(Self::Skew),
            "power-loss" => Some(Self::PowerLoss),
            _ => None,
        }
    }
}

struct Args {
    config: Option<PathBuf>,
    frames: u64,
    scenario: Scenario,
    content_every: u64,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: holowatch_sim [--config <path>] [--frames <n>] [--scenario <name>] [--content-every <n>]\n\n\
         Scenarios: nominal, overheat, tracking, skew, power-loss\n\
         Defaults: 120 frames, nominal, new content every 4 frames\n\n{}",
        debug_flags_help()
    );
    process::exit(2);
}

fn parse_args() -> Args {
    let mut parsed = Args {
        config: None,
        frames: 120,
        scenario: Scenario::Nominal,
        content_every: 4,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.config = Some(PathBuf::from(v));
            }
            "--frames" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.frames = v.parse().unwrap_or_else(|_| usage_and_exit());
            }
            "--scenario" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                parsed.scenario = Scenario::parse(&v).unwrap_or_else(|| usage_and_exit());
            }
            "--content-every" => {
                let v = args.next().unwrap_or_else(|| usage_and_exit());
                let every: u64 = v.parse().unwrap_or_else(|_| usage_and_exit());
                parsed.content_every = every.max(1);
            }
            "-h" | "--help" => usage_and_exit(),
            other if other.starts_with("--debug-") => {}
            other => {
                eprintln!("Unknown argument: {other}");
                usage_and_exit();
            }
        }
    }
    parsed
}

/// A drifting bright band at a slowly changing depth
fn content(frame_id: u64, config: &HolowatchConfig) -> Result<HologramTarget> {
    let rows = config.meta_surface.rows;
    let cols = config.meta_surface.cols;
    let shift = frame_id as usize;
    let drift_mm = (frame_id % 50) as f32;
    let depth = Array2::from_shape_fn((rows, cols), |(r, _)| 300.0 + 2.0 * r as f32 + drift_mm);
    let amplitude = Array2::from_shape_fn((rows, cols), |(r, c)| {
        if (r + c + shift) % cols < cols / 3 {
            0.9
        } else {
            0.2
        }
    });
    let phase = Array2::zeros((rows, cols));
    let channels = config.laser.channel_count();
    HologramTarget::new(frame_id, depth, amplitude, phase, channels)
        .and_then(|t| t.with_luminance(0.6))
        .with_context(|| format!("Failed to build target for frame {}", frame_id))
}

fn inject(scenario: Scenario, handles: &SimHandles, config: &HolowatchConfig) {
    match scenario {
        Scenario::Nominal => {}
        Scenario::Overheat => handles
            .meta_surface
            .set_temperature_c(config.safety.max_meta_surface_temp_c + 5.0),
        Scenario::Tracking => handles
            .mirror
            .inject_position_error_deg(3.0 * config.mems.tracking_tolerance_deg),
        Scenario::Skew => handles.laser.inject_timing_skew_us(50),
        Scenario::PowerLoss => handles.power.clear(),
    }
    if scenario != Scenario::Nominal {
        warn!("[SIM] Injected {:?}", scenario);
    }
}

fn main() -> Result<()> {
    let args = parse_args();

    let config = match &args.config {
        Some(path) => load_config(Some(path), None)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            let mut config = HolowatchConfig::default();
            apply_environment_overrides(&mut config)
                .context("Invalid HOLOWATCH_* environment override")?;
            config
        }
    };

    let debug_flags = parse_debug_flags();
    let observability = ObservabilityConfig {
        level: if config.system.debug {
            "debug".to_string()
        } else {
            config.system.log_level.clone()
        },
        ..ObservabilityConfig::default()
    };
    init_console_logging(&debug_flags, &observability)?;

    let clock = SimClock::new(0);
    let time: Arc<dyn TimeProvider> = Arc::new(clock.clone());
    let settings = SimSettings {
        channel_full_scale_w: config.laser.channel_full_scale_w.clone(),
        meta_rows: config.meta_surface.rows,
        meta_cols: config.meta_surface.cols,
        meta_drive_levels: config.meta_surface.phase_levels,
        ..SimSettings::default()
    };
    let (platform, handles) = SimulatedPlatform::new(&settings, time.clone());
    let devices = DeviceSet {
        kill_switches: vec![
            platform.laser.kill_switch(),
            platform.mirror.kill_switch(),
            platform.meta_surface.kill_switch(),
        ],
        laser: Box::new(platform.laser),
        mirror: Box::new(platform.mirror),
        meta_surface: Box::new(platform.meta_surface),
        power: Arc::new(platform.power),
    };

    let core = DisplayCore::assemble(&config, devices, time.clone())
        .context("Failed to assemble display core")?;
    core.scheduler()
        .lock()
        .start()
        .context("Start refused by safety interlock")?;

    let period_us = config.frame_period().as_micros() as u64;
    let watchdog_us = (config.frame.watchdog_period_ms * 1000.0) as u64;
    let targets = core.targets();
    info!(
        "[SIM] Running {} frames ({:?}) at {:.1} Hz",
        args.frames, args.scenario, config.frame.frame_rate_hz
    );

    for frame in 0..args.frames {
        if frame == args.frames / 2 {
            inject(args.scenario, &handles, &config);
        }
        if frame % args.content_every == 0 {
            targets.push(content(frame + 1, &config)?);
        }

        let cycle_start = clock.get_time_us();
        let outcome = core.scheduler().lock().run_cycle();
        if let CycleOutcome::Faulted(cause) = outcome {
            warn!("[SIM] Frame {} faulted: {}", frame, cause);
        }

        // Watchdog checks for the rest of the frame period
        let mut next_check = clock.get_time_us();
        while next_check < cycle_start + period_us {
            clock.set_time_us(next_check);
            core.watchdog().check_once();
            next_check += watchdog_us.max(1);
        }
        clock.set_time_us(clock.get_time_us().max(cycle_start + period_us));
    }

    let status = core.status();
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("Failed to serialize status report")?
    );
    Ok(())
}
