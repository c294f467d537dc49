// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Laser controller
//!
//! Last line of defence before photons: every vector is re-validated against
//! the envelope here, independently of what the optimizer already did.
//! Small overshoots are clamped; anything past the hard margin is refused and
//! the output forced to zero.

use holowatch_config::{LaserConfig, SafetyEnvelope};
use holowatch_hal::LaserInterface;
use holowatch_structures::{ControllerKind, IntensityVector, LaserReading};
use tracing::{debug, error, warn};

use crate::error::{ControllerError, ControllerResult};

/// Visible band accepted for laser channels
pub const VISIBLE_BAND_NM: std::ops::RangeInclusive<f64> = 400.0..=700.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Applied,
    /// The vector exceeded a ceiling within the hard margin and was scaled down
    Clamped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaserAck {
    pub status: ApplyStatus,
    pub applied: IntensityVector,
    pub power_w: f64,
    /// When modulation actually begins on the device
    pub emission_start_us: u64,
}

pub struct LaserController {
    device: Box<dyn LaserInterface>,
    full_scale_w: Vec<f64>,
    max_channel_w: f64,
    max_aggregate_w: f64,
    hard_margin: f64,
    timeout_us: u64,
    last_applied: IntensityVector,
}

impl LaserController {
    pub fn new(
        device: Box<dyn LaserInterface>,
        config: &LaserConfig,
        envelope: &SafetyEnvelope,
    ) -> ControllerResult<Self> {
        let mismatch = |reason: String| ControllerError::Configuration {
            controller: ControllerKind::Laser,
            reason,
        };
        if device.channel_count() != config.channel_count() {
            return Err(mismatch(format!(
                "{} drives {} channels, configuration lists {}",
                device.name(),
                device.channel_count(),
                config.channel_count()
            )));
        }
        if config.wavelengths_nm.len() != config.channel_count() {
            return Err(mismatch(format!(
                "{} wavelengths for {} channels",
                config.wavelengths_nm.len(),
                config.channel_count()
            )));
        }
        if let Some(nm) = config
            .wavelengths_nm
            .iter()
            .find(|nm| !VISIBLE_BAND_NM.contains(*nm))
        {
            return Err(mismatch(format!("wavelength {} nm outside the visible band", nm)));
        }
        if config.channel_full_scale_w.iter().any(|fs| *fs <= 0.0) {
            return Err(mismatch("channel full scale must be positive".to_string()));
        }

        Ok(Self {
            last_applied: IntensityVector::zeros(config.channel_count()),
            device,
            full_scale_w: config.channel_full_scale_w.clone(),
            max_channel_w: envelope.max_channel_power_w,
            max_aggregate_w: envelope.max_aggregate_laser_power_w,
            hard_margin: config.hard_margin_fraction,
            timeout_us: config.actuator_timeout_us,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.full_scale_w.len()
    }

    pub fn full_scale_w(&self) -> &[f64] {
        &self.full_scale_w
    }

    pub fn last_applied(&self) -> &IntensityVector {
        &self.last_applied
    }

    /// Clamp-and-validate, then load the vector co-timed to `start_at_us`
    pub fn apply(
        &mut self,
        intensity: &IntensityVector,
        start_at_us: u64,
    ) -> ControllerResult<LaserAck> {
        if intensity.len() != self.channel_count() {
            return Err(ControllerError::InvalidCommand {
                controller: ControllerKind::Laser,
                reason: format!(
                    "{} channels commanded, {} driven",
                    intensity.len(),
                    self.channel_count()
                ),
            });
        }

        let (values, status) = match self.clamp(intensity) {
            Ok(clamped) => clamped,
            Err(err) => {
                error!("[LASER] {}; forcing output to zero", err);
                if let Err(zero_err) = self.force_zero(start_at_us) {
                    error!("[LASER] Force-zero after unsafe command failed: {}", zero_err);
                }
                return Err(err);
            }
        };

        let emission_start_us = self
            .device
            .set_intensity(&values, start_at_us, self.timeout_us)
            .map_err(|e| ControllerError::from_hal(ControllerKind::Laser, e))?;

        let applied = IntensityVector::new(values).map_err(|e| ControllerError::InvalidCommand {
            controller: ControllerKind::Laser,
            reason: e.to_string(),
        })?;
        let power_w = applied.power_w(&self.full_scale_w);
        debug!(
            "[LASER] Applied {:?} ({:.3} W, {:?}) starting at {} us",
            applied.as_slice(),
            power_w,
            status,
            emission_start_us
        );
        self.last_applied = applied.clone();

        Ok(LaserAck {
            status,
            applied,
            power_w,
            emission_start_us,
        })
    }

    /// Load an all-zero vector
    pub fn force_zero(&mut self, now_us: u64) -> ControllerResult<()> {
        let zeros = vec![0.0; self.channel_count()];
        self.device
            .set_intensity(&zeros, now_us, self.timeout_us)
            .map_err(|e| ControllerError::from_hal(ControllerKind::Laser, e))?;
        self.last_applied = IntensityVector::zeros(self.channel_count());
        Ok(())
    }

    /// Measured draw, hottest channel and junction temperature
    pub fn read_telemetry(&self) -> ControllerResult<LaserReading> {
        self.device
            .read_telemetry()
            .map_err(|e| ControllerError::from_hal(ControllerKind::Laser, e))
    }

    fn clamp(&self, intensity: &IntensityVector) -> ControllerResult<(Vec<f64>, ApplyStatus)> {
        let hard = 1.0 + self.hard_margin;
        let channel_w = intensity.channel_power_w(&self.full_scale_w);
        let requested_w: f64 = channel_w.iter().sum();

        if let Some(worst) = channel_w
            .iter()
            .copied()
            .find(|w| *w > self.max_channel_w * hard)
        {
            return Err(ControllerError::UnsafeCommand {
                requested_w: worst,
                limit_w: self.max_channel_w * hard,
            });
        }
        if requested_w > self.max_aggregate_w * hard {
            return Err(ControllerError::UnsafeCommand {
                requested_w,
                limit_w: self.max_aggregate_w * hard,
            });
        }

        let mut status = ApplyStatus::Applied;
        let mut values: Vec<f64> = intensity
            .as_slice()
            .iter()
            .zip(&self.full_scale_w)
            .map(|(i, fs)| {
                let ceiling = (self.max_channel_w / fs).min(1.0);
                if *i > ceiling {
                    status = ApplyStatus::Clamped;
                    ceiling
                } else {
                    *i
                }
            })
            .collect();

        let total_w: f64 = values.iter().zip(&self.full_scale_w).map(|(i, fs)| i * fs).sum();
        if total_w > self.max_aggregate_w {
            status = ApplyStatus::Clamped;
            // Stay strictly below the ceiling after rounding
            let scale = self.max_aggregate_w / total_w * (1.0 - 1e-9);
            values.iter_mut().for_each(|v| *v *= scale);
        }

        if status == ApplyStatus::Clamped {
            warn!(
                "[LASER] Clamped {:.3} W request to envelope ({:.3} W aggregate, {:.3} W/channel)",
                requested_w, self.max_aggregate_w, self.max_channel_w
            );
        }
        Ok((values, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holowatch_hal::simulated::{SimClock, SimSettings, SimulatedPlatform};
    use std::sync::Arc;

    fn controller() -> (LaserController, holowatch_hal::simulated::SimLaserHandle) {
        let clock = Arc::new(SimClock::new(0));
        let (platform, handles) = SimulatedPlatform::new(&SimSettings::default(), clock);
        let controller = LaserController::new(
            Box::new(platform.laser),
            &LaserConfig::default(),
            &SafetyEnvelope::default(),
        )
        .unwrap();
        (controller, handles.laser)
    }

    #[test]
    fn test_in_envelope_vector_applied_unchanged() {
        let (mut laser, handle) = controller();
        let ack = laser
            .apply(&IntensityVector::new(vec![0.5, 0.4, 0.3]).unwrap(), 100)
            .unwrap();
        assert_eq!(ack.status, ApplyStatus::Applied);
        assert_eq!(ack.emission_start_us, 100);
        assert_eq!(handle.emitted(), vec![0.5, 0.4, 0.3]);
        assert!((laser.read_telemetry().unwrap().draw_w - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_small_overshoot_clamped() {
        let (mut laser, handle) = controller();
        // 0.9 W on channel 0 is above 0.8 W but within the 25% margin
        let ack = laser
            .apply(&IntensityVector::new(vec![0.9, 0.7, 0.7]).unwrap(), 0)
            .unwrap();
        assert_eq!(ack.status, ApplyStatus::Clamped);
        assert!(ack.power_w <= 2.0);
        assert!(handle.emitted().iter().all(|v| *v <= 0.8));
        assert_eq!(laser.last_applied(), &ack.applied);
    }

    #[test]
    fn test_beyond_hard_margin_forces_zero() {
        let (mut laser, handle) = controller();
        laser
            .apply(&IntensityVector::new(vec![0.5, 0.5, 0.5]).unwrap(), 0)
            .unwrap();

        // 2.8 W aggregate is past 2.0 W * 1.25
        let err = laser
            .apply(&IntensityVector::new(vec![1.0, 0.9, 0.9]).unwrap(), 10)
            .unwrap_err();
        assert!(matches!(err, ControllerError::UnsafeCommand { .. }));
        assert_eq!(handle.output_power_w(), 0.0);
        assert!(laser.last_applied().is_zero());
    }

    #[test]
    fn test_out_of_band_wavelength_rejected() {
        let clock = Arc::new(SimClock::new(0));
        let (platform, _) = SimulatedPlatform::new(&SimSettings::default(), clock);
        let config = LaserConfig {
            wavelengths_nm: vec![638.0, 520.0, 940.0],
            ..LaserConfig::default()
        };
        let result = LaserController::new(
            Box::new(platform.laser),
            &config,
            &SafetyEnvelope::default(),
        );
        assert!(matches!(result, Err(ControllerError::Configuration { .. })));
    }

    #[test]
    fn test_device_timeout_mapped() {
        let (mut laser, handle) = controller();
        handle.inject_latency_us(5_000);
        let err = laser
            .apply(&IntensityVector::new(vec![0.1, 0.1, 0.1]).unwrap(), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Timeout { controller: ControllerKind::Laser, .. }
        ));
    }
}
