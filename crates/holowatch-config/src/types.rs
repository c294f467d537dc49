// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `holowatch_configuration.toml`.

use core::str::FromStr;
use core::time::Duration;
use serde::{Deserialize, Serialize};

#[cfg(feature = "std")]
use std::path::PathBuf;

use crate::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HolowatchConfig {
    pub system: SystemConfig,
    pub frame: FrameConfig,
    pub safety: SafetyEnvelope,
    pub optimizer: OptimizerConfig,
    pub laser: LaserConfig,
    pub mems: MemsConfig,
    pub meta_surface: MetaSurfaceConfig,
    pub logging: LoggingConfig,
}

impl HolowatchConfig {
    /// Nominal frame period derived from `frame.frame_rate_hz`
    pub fn frame_period(&self) -> Duration {
        self.frame.frame_period()
    }

    /// Wall-clock budget the optimizer gets per frame
    pub fn optimizer_budget(&self) -> Duration {
        self.frame_period()
            .mul_f64(self.frame.optimizer_budget_fraction.clamp(0.0, 1.0))
    }
}

/// System-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub debug: bool,
    pub log_level: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

/// What the scheduler presents when the optimizer declares a target infeasible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InfeasibleFramePolicy {
    /// Re-present the previous frame's plan
    Hold,
    /// Present a zero-emission frame
    Blank,
}

impl FromStr for InfeasibleFramePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hold" => Ok(Self::Hold),
            "blank" => Ok(Self::Blank),
            other => Err(ConfigError::InvalidValue(format!(
                "infeasible_frame_policy must be 'hold' or 'blank', got '{}'",
                other
            ))),
        }
    }
}

/// Frame cycle timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrameConfig {
    pub frame_rate_hz: f64,
    /// Fraction of one frame period the optimizer may spend computing a plan
    pub optimizer_budget_fraction: f64,
    /// Bounded wait for MEMS / meta-surface settling after dispatch
    pub settle_timeout_ms: f64,
    pub settle_poll_us: u64,
    pub infeasible_frame_policy: InfeasibleFramePolicy,
    /// Interval between safety watchdog checks
    pub watchdog_period_ms: f64,
}

impl FrameConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.settle_timeout_ms / 1000.0)
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_secs_f64(self.watchdog_period_ms / 1000.0)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 60.0,
            optimizer_budget_fraction: 0.4,
            settle_timeout_ms: 4.0,
            settle_poll_us: 100,
            infeasible_frame_policy: InfeasibleFramePolicy::Hold,
            watchdog_period_ms: 5.0,
        }
    }
}

/// Hard eye-safety and thermal limits.
///
/// Loaded once at startup; read-only thereafter. Environment and CLI
/// overrides never touch these values.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SafetyEnvelope {
    pub max_aggregate_laser_power_w: f64,
    pub max_channel_power_w: f64,
    pub max_junction_temp_c: f64,
    pub max_meta_surface_temp_c: f64,
    pub max_mems_position_error_deg: f64,
    /// Longest tolerated gap between frame-cycle heartbeats
    pub watchdog_deadline_ms: f64,
    /// Available power budget required by the Start precheck
    pub min_start_power_budget_w: f64,
    /// Fraction of a limit at which a warning is journaled
    pub warning_fraction: f64,
    /// Fraction of a limit below which an active warning clears
    pub recovery_fraction: f64,
}

impl SafetyEnvelope {
    pub fn watchdog_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.watchdog_deadline_ms / 1000.0)
    }

    /// Check the envelope is internally consistent.
    ///
    /// An invalid envelope is a fatal configuration error: nothing may be armed with it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("max_aggregate_laser_power_w", self.max_aggregate_laser_power_w),
            ("max_channel_power_w", self.max_channel_power_w),
            ("max_junction_temp_c", self.max_junction_temp_c),
            ("max_meta_surface_temp_c", self.max_meta_surface_temp_c),
            ("max_mems_position_error_deg", self.max_mems_position_error_deg),
            ("watchdog_deadline_ms", self.watchdog_deadline_ms),
        ];
        for (name, value) in limits {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidEnvelope(format!(
                    "safety.{} must be finite and positive (got {})",
                    name, value
                )));
            }
        }
        if self.max_channel_power_w > self.max_aggregate_laser_power_w {
            return Err(ConfigError::InvalidEnvelope(format!(
                "safety.max_channel_power_w ({}) exceeds safety.max_aggregate_laser_power_w ({})",
                self.max_channel_power_w, self.max_aggregate_laser_power_w
            )));
        }
        if !self.min_start_power_budget_w.is_finite() || self.min_start_power_budget_w < 0.0 {
            return Err(ConfigError::InvalidEnvelope(
                "safety.min_start_power_budget_w must be finite and non-negative".to_string(),
            ));
        }
        if !(self.recovery_fraction > 0.0
            && self.recovery_fraction < self.warning_fraction
            && self.warning_fraction < 1.0)
        {
            return Err(ConfigError::InvalidEnvelope(format!(
                "safety fractions must satisfy 0 < recovery ({}) < warning ({}) < 1",
                self.recovery_fraction, self.warning_fraction
            )));
        }
        Ok(())
    }
}

impl Default for SafetyEnvelope {
    fn default() -> Self {
        Self {
            max_aggregate_laser_power_w: 2.0,
            max_channel_power_w: 0.8,
            max_junction_temp_c: 45.0,
            max_meta_surface_temp_c: 45.0,
            max_mems_position_error_deg: 0.5,
            watchdog_deadline_ms: 50.0,
            min_start_power_budget_w: 0.5,
            warning_fraction: 0.85,
            recovery_fraction: 0.75,
        }
    }
}

/// How the optimizer handles a target that cannot be shown at full quality within the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InfeasibilityPolicy {
    /// Scale down to the envelope and report reduced quality confidence
    Clamp,
    /// Reject the target outright
    Fail,
}

impl FromStr for InfeasibilityPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clamp" => Ok(Self::Clamp),
            "fail" => Ok(Self::Fail),
            other => Err(ConfigError::InvalidValue(format!(
                "infeasibility_policy must be 'clamp' or 'fail', got '{}'",
                other
            ))),
        }
    }
}

/// Projection optimizer tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub infeasibility_policy: InfeasibilityPolicy,
    pub max_iterations: u32,
    pub convergence_tolerance: f64,
    pub step_size: f64,
    pub quality_weight: f64,
    pub power_weight: f64,
    pub budget_penalty_weight: f64,
    pub temporal_coherence_weight: f64,
    /// Lowest acceptable luminance relative to the target's request
    pub min_luminance_fraction: f64,
    /// Thermal headroom below which the power budget is derated linearly to zero
    pub thermal_derate_headroom_c: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            infeasibility_policy: InfeasibilityPolicy::Clamp,
            max_iterations: 64,
            convergence_tolerance: 1e-7,
            step_size: 0.25,
            quality_weight: 1.0,
            power_weight: 0.05,
            budget_penalty_weight: 2.0,
            temporal_coherence_weight: 0.05,
            min_luminance_fraction: 0.2,
            thermal_derate_headroom_c: 5.0,
        }
    }
}

/// Laser source description
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LaserConfig {
    /// Optical power per channel at intensity 1.0
    pub channel_full_scale_w: Vec<f64>,
    pub wavelengths_nm: Vec<f64>,
    /// Relative overshoot beyond which a command is rejected instead of clamped
    pub hard_margin_fraction: f64,
    pub actuator_timeout_us: u64,
}

impl LaserConfig {
    pub fn channel_count(&self) -> usize {
        self.channel_full_scale_w.len()
    }

    pub fn mean_wavelength_nm(&self) -> f64 {
        if self.wavelengths_nm.is_empty() {
            return 0.0;
        }
        self.wavelengths_nm.iter().sum::<f64>() / self.wavelengths_nm.len() as f64
    }
}

impl Default for LaserConfig {
    fn default() -> Self {
        Self {
            channel_full_scale_w: vec![1.0, 1.0, 1.0],
            wavelengths_nm: vec![638.0, 520.0, 450.0],
            hard_margin_fraction: 0.25,
            actuator_timeout_us: 2_000,
        }
    }
}

/// MEMS scanner description
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemsConfig {
    pub lines: u32,
    pub samples_per_line: u32,
    pub max_scan_half_angle_deg: f64,
    /// Share of the frame period spent in the active scan
    pub scan_fill_fraction: f64,
    pub tracking_tolerance_deg: f64,
    /// Consecutive out-of-tolerance cycles that constitute a tracking fault
    pub tracking_fault_cycles: u32,
    pub drive_power_w_per_deg2: f64,
    pub actuator_timeout_us: u64,
}

impl Default for MemsConfig {
    fn default() -> Self {
        Self {
            lines: 48,
            samples_per_line: 64,
            max_scan_half_angle_deg: 15.0,
            scan_fill_fraction: 0.9,
            tracking_tolerance_deg: 0.1,
            tracking_fault_cycles: 2,
            drive_power_w_per_deg2: 0.000_5,
            actuator_timeout_us: 2_000,
        }
    }
}

/// Meta-surface description
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetaSurfaceConfig {
    pub rows: usize,
    pub cols: usize,
    pub element_pitch_um: f64,
    pub phase_levels: u32,
    pub reference_temp_c: f64,
    pub phase_temp_coefficient_rad_per_c: f64,
    pub drive_power_w: f64,
    pub actuator_timeout_us: u64,
}

impl MetaSurfaceConfig {
    pub fn element_count(&self) -> usize {
        self.rows * self.cols
    }
}

impl Default for MetaSurfaceConfig {
    fn default() -> Self {
        Self {
            rows: 32,
            cols: 32,
            element_pitch_um: 8.0,
            phase_levels: 256,
            reference_temp_c: 25.0,
            phase_temp_coefficient_rad_per_c: 0.002,
            drive_power_w: 0.05,
            actuator_timeout_us: 2_000,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    #[cfg(feature = "std")]
    pub log_dir: PathBuf,
    #[cfg(not(feature = "std"))]
    pub log_dir: String,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            #[cfg(feature = "std")]
            log_dir: PathBuf::from("./logs"),
            #[cfg(not(feature = "std"))]
            log_dir: String::from("./logs"),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
