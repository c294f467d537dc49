// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Emission inhibit lines, reachable without any controller lock.
pub mod kill_switch;
/// Laser source command sink and telemetry.
pub mod laser;
/// Meta-surface command sink and telemetry.
pub mod meta_surface;
/// MEMS mirror command sink and telemetry.
pub mod mirror;
/// Power budget telemetry.
pub mod power;
/// Device telemetry read paths independent of the command sinks.
pub mod telemetry;
/// Hardware Abstraction Layer (HAL) trait definitions
///
/// This module defines platform-agnostic traits that each platform
/// implements to provide:
/// - Time management (TimeProvider)
/// - Actuator command sinks (LaserInterface, MirrorInterface, MetaSurfaceInterface)
/// - Power and device telemetry (PowerTelemetrySource, DeviceTelemetry)
/// - Emission inhibit (KillSwitch)

/// Timekeeping abstractions (monotonic timers, delays).
pub mod time;

pub use kill_switch::{AtomicKillSwitch, KillSwitch};
pub use laser::LaserInterface;
pub use meta_surface::MetaSurfaceInterface;
pub use mirror::{MirrorInterface, ScanEpoch};
pub use power::PowerTelemetrySource;
pub use telemetry::{DeviceTelemetry, LaserTelemetry, MetaSurfaceTelemetry, MirrorTelemetry};
pub use time::TimeProvider;
