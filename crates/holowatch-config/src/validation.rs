// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Ensures configuration values are within range and consistent with each
//! other before any actuator is armed.

use crate::{ConfigError, ConfigResult, HolowatchConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    OutOfRange { field: String, reason: String },
    LengthMismatch { field1: String, field2: String, len1: usize, len2: usize },
    InvalidEnvelope { reason: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange { field, reason } => {
                write!(f, "{} is out of range: {}", field, reason)
            }
            Self::LengthMismatch {
                field1,
                field2,
                len1,
                len2,
            } => {
                write!(
                    f,
                    "Length mismatch: {} has {} entries but {} has {}",
                    field1, len1, field2, len2
                )
            }
            Self::InvalidEnvelope { reason } => {
                write!(f, "Invalid safety envelope: {}", reason)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Safety envelope consistency
/// - Frame timing ranges
/// - Optimizer weights and tolerances
/// - Actuator descriptions (channel counts, wavelengths, grid sizes)
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` with details if validation fails
pub fn validate_config(config: &HolowatchConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_envelope(config, &mut errors);
    validate_frame(config, &mut errors);
    validate_optimizer(config, &mut errors);
    validate_actuators(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn positive(field: &str, value: f64, errors: &mut Vec<ConfigValidationError>) {
    if !value.is_finite() || value <= 0.0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: field.to_string(),
            reason: format!("must be positive (got {})", value),
        });
    }
}

fn unit_interval(field: &str, value: f64, errors: &mut Vec<ConfigValidationError>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ConfigValidationError::OutOfRange {
            field: field.to_string(),
            reason: format!("must be between 0.0 and 1.0 (got {})", value),
        });
    }
}

fn validate_envelope(config: &HolowatchConfig, errors: &mut Vec<ConfigValidationError>) {
    if let Err(err) = config.safety.validate() {
        let reason = match err {
            ConfigError::InvalidEnvelope(reason) => reason,
            other => other.to_string(),
        };
        errors.push(ConfigValidationError::InvalidEnvelope { reason });
    }
}

fn validate_frame(config: &HolowatchConfig, errors: &mut Vec<ConfigValidationError>) {
    let frame = &config.frame;
    positive("frame.frame_rate_hz", frame.frame_rate_hz, errors);
    if frame.frame_rate_hz > 1000.0 {
        errors.push(ConfigValidationError::OutOfRange {
            field: "frame.frame_rate_hz".to_string(),
            reason: "must not exceed 1000 Hz".to_string(),
        });
    }
    if !(frame.optimizer_budget_fraction > 0.0 && frame.optimizer_budget_fraction <= 1.0) {
        errors.push(ConfigValidationError::OutOfRange {
            field: "frame.optimizer_budget_fraction".to_string(),
            reason: "must be in (0.0, 1.0]".to_string(),
        });
    }
    positive("frame.settle_timeout_ms", frame.settle_timeout_ms, errors);
    positive("frame.watchdog_period_ms", frame.watchdog_period_ms, errors);
    if frame.settle_poll_us == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "frame.settle_poll_us".to_string(),
            reason: "must be non-zero".to_string(),
        });
    }

    // The watchdog must be able to observe a missed deadline before it expires twice over
    if frame.watchdog_period_ms.is_finite()
        && frame.watchdog_period_ms >= config.safety.watchdog_deadline_ms
    {
        errors.push(ConfigValidationError::InvalidValue {
            field: "frame.watchdog_period_ms".to_string(),
            reason: format!(
                "must be shorter than safety.watchdog_deadline_ms ({})",
                config.safety.watchdog_deadline_ms
            ),
        });
    }
    if frame.frame_rate_hz > 0.0 {
        let frame_period_ms = 1000.0 / frame.frame_rate_hz;
        if frame_period_ms >= config.safety.watchdog_deadline_ms {
            errors.push(ConfigValidationError::InvalidValue {
                field: "safety.watchdog_deadline_ms".to_string(),
                reason: format!(
                    "must exceed one frame period ({:.3} ms)",
                    frame_period_ms
                ),
            });
        }
    }
}

fn validate_optimizer(config: &HolowatchConfig, errors: &mut Vec<ConfigValidationError>) {
    let opt = &config.optimizer;
    if opt.max_iterations == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "optimizer.max_iterations".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    positive("optimizer.convergence_tolerance", opt.convergence_tolerance, errors);
    positive("optimizer.step_size", opt.step_size, errors);
    positive("optimizer.quality_weight", opt.quality_weight, errors);
    positive(
        "optimizer.thermal_derate_headroom_c",
        opt.thermal_derate_headroom_c,
        errors,
    );
    for (field, value) in [
        ("optimizer.power_weight", opt.power_weight),
        ("optimizer.budget_penalty_weight", opt.budget_penalty_weight),
        ("optimizer.temporal_coherence_weight", opt.temporal_coherence_weight),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: field.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
    }
    unit_interval("optimizer.min_luminance_fraction", opt.min_luminance_fraction, errors);
}

fn validate_actuators(config: &HolowatchConfig, errors: &mut Vec<ConfigValidationError>) {
    let laser = &config.laser;
    if laser.channel_full_scale_w.is_empty() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "laser.channel_full_scale_w".to_string(),
            reason: "at least one channel is required".to_string(),
        });
    }
    if laser.channel_full_scale_w.len() != laser.wavelengths_nm.len() {
        errors.push(ConfigValidationError::LengthMismatch {
            field1: "laser.channel_full_scale_w".to_string(),
            field2: "laser.wavelengths_nm".to_string(),
            len1: laser.channel_full_scale_w.len(),
            len2: laser.wavelengths_nm.len(),
        });
    }
    for (i, fs) in laser.channel_full_scale_w.iter().enumerate() {
        positive(&format!("laser.channel_full_scale_w[{}]", i), *fs, errors);
    }
    for (i, wl) in laser.wavelengths_nm.iter().enumerate() {
        if !(400.0..=700.0).contains(wl) {
            errors.push(ConfigValidationError::OutOfRange {
                field: format!("laser.wavelengths_nm[{}]", i),
                reason: format!("must be within 400-700 nm (got {})", wl),
            });
        }
    }
    unit_interval("laser.hard_margin_fraction", laser.hard_margin_fraction, errors);

    let mems = &config.mems;
    if mems.lines == 0 || mems.samples_per_line < 2 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "mems.lines / mems.samples_per_line".to_string(),
            reason: "need at least one line of two samples".to_string(),
        });
    }
    if !(mems.max_scan_half_angle_deg > 0.0 && mems.max_scan_half_angle_deg <= 45.0) {
        errors.push(ConfigValidationError::OutOfRange {
            field: "mems.max_scan_half_angle_deg".to_string(),
            reason: "must be in (0, 45] degrees".to_string(),
        });
    }
    if !(mems.scan_fill_fraction > 0.0 && mems.scan_fill_fraction <= 1.0) {
        errors.push(ConfigValidationError::OutOfRange {
            field: "mems.scan_fill_fraction".to_string(),
            reason: "must be in (0.0, 1.0]".to_string(),
        });
    }
    positive("mems.tracking_tolerance_deg", mems.tracking_tolerance_deg, errors);
    if mems.tracking_fault_cycles == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "mems.tracking_fault_cycles".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let meta = &config.meta_surface;
    if meta.rows == 0 || meta.cols == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "meta_surface.rows / meta_surface.cols".to_string(),
            reason: "grid must be non-empty".to_string(),
        });
    }
    if meta.phase_levels < 2 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "meta_surface.phase_levels".to_string(),
            reason: "must be at least 2".to_string(),
        });
    }
    positive("meta_surface.element_pitch_um", meta.element_pitch_um, errors);
}
