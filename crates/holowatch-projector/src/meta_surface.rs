// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Meta-surface controller
//!
//! Turns a phase map into per-element drive levels. Element phase drifts with
//! temperature, so the commanded phase is pre-compensated by the measured
//! offset from the reference temperature before quantization.

use std::f32::consts::TAU;

use holowatch_config::{MetaSurfaceConfig, SafetyEnvelope};
use holowatch_hal::MetaSurfaceInterface;
use holowatch_structures::{ControllerKind, MetaSurfaceReading, PhaseMap};
use ndarray::{Array2, Zip};
use tracing::{debug, warn};

use crate::error::{ControllerError, ControllerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStatus {
    Settled,
    NotSettled,
}

pub struct MetaSurfaceController {
    device: Box<dyn MetaSurfaceInterface>,
    levels: u32,
    reference_temp_c: f64,
    temp_coefficient: f64,
    max_temp_c: f64,
    timeout_us: u64,
}

impl MetaSurfaceController {
    pub fn new(
        device: Box<dyn MetaSurfaceInterface>,
        config: &MetaSurfaceConfig,
        envelope: &SafetyEnvelope,
    ) -> ControllerResult<Self> {
        if device.dimensions() != (config.rows, config.cols) {
            return Err(ControllerError::Configuration {
                controller: ControllerKind::MetaSurface,
                reason: format!(
                    "{} has {:?} elements, configuration expects {:?}",
                    device.name(),
                    device.dimensions(),
                    (config.rows, config.cols)
                ),
            });
        }
        let levels = device.drive_levels().min(config.phase_levels);
        if levels < 2 || levels > u32::from(u16::MAX) + 1 {
            return Err(ControllerError::Configuration {
                controller: ControllerKind::MetaSurface,
                reason: format!("unsupported drive level count {}", levels),
            });
        }
        if levels != config.phase_levels {
            warn!(
                "[META-SURFACE] {} supports {} levels, configured {}; using {}",
                device.name(),
                device.drive_levels(),
                config.phase_levels,
                levels
            );
        }

        Ok(Self {
            device,
            levels,
            reference_temp_c: config.reference_temp_c,
            temp_coefficient: config.phase_temp_coefficient_rad_per_c,
            max_temp_c: envelope.max_meta_surface_temp_c,
            timeout_us: config.actuator_timeout_us,
        })
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.device.dimensions()
    }

    /// Drive levels for `map` at `temperature_c`
    pub fn quantize(&self, map: &PhaseMap, temperature_c: f64) -> Array2<u16> {
        let drift = (self.temp_coefficient * (temperature_c - self.reference_temp_c)) as f32;
        let count = self.levels;
        let scale = count as f32 / TAU;
        let mut out = Array2::<u16>::zeros(map.dim());
        Zip::from(&mut out)
            .and(map.phases())
            .par_for_each(|level, phase| {
                let corrected = (phase - drift).rem_euclid(TAU);
                *level = ((corrected * scale).round() as u32 % count) as u16;
            });
        out
    }

    /// Load `map`; the surface then settles asynchronously.
    ///
    /// Refused while the surface is above its temperature limit.
    pub fn apply(&mut self, map: &PhaseMap) -> ControllerResult<()> {
        if map.dim() != self.dimensions() {
            return Err(ControllerError::InvalidCommand {
                controller: ControllerKind::MetaSurface,
                reason: format!(
                    "phase map {:?} for a {:?} surface",
                    map.dim(),
                    self.dimensions()
                ),
            });
        }

        let reading = self.read_telemetry()?;
        if reading.temperature_c > self.max_temp_c {
            warn!(
                "[META-SURFACE] Refusing phase map at {:.1} C (limit {:.1} C)",
                reading.temperature_c, self.max_temp_c
            );
            return Err(ControllerError::OverTemperature {
                measured_c: reading.temperature_c,
                limit_c: self.max_temp_c,
            });
        }

        let drive = self.quantize(map, reading.temperature_c);
        self.device
            .set_drive(&drive, self.timeout_us)
            .map_err(|e| ControllerError::from_hal(ControllerKind::MetaSurface, e))?;
        debug!(
            "[META-SURFACE] Loaded {:?} drive map at {:.1} C",
            drive.dim(),
            reading.temperature_c
        );
        Ok(())
    }

    /// Never reports completion for a partially settled wavefront
    pub fn poll_settled(&self) -> SettleStatus {
        if self.device.is_settled() {
            SettleStatus::Settled
        } else {
            SettleStatus::NotSettled
        }
    }

    pub fn read_telemetry(&self) -> ControllerResult<MetaSurfaceReading> {
        self.device
            .read_telemetry()
            .map_err(|e| ControllerError::from_hal(ControllerKind::MetaSurface, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holowatch_hal::simulated::{SimClock, SimMetaSurfaceHandle, SimSettings, SimulatedPlatform};
    use holowatch_hal::TimeProvider;
    use std::sync::Arc;

    fn controller() -> (MetaSurfaceController, SimMetaSurfaceHandle, SimClock) {
        let clock = SimClock::new(0);
        let settings = SimSettings {
            meta_rows: 4,
            meta_cols: 4,
            ..SimSettings::default()
        };
        let (platform, handles) = SimulatedPlatform::new(&settings, Arc::new(clock.clone()));
        let config = MetaSurfaceConfig {
            rows: 4,
            cols: 4,
            ..MetaSurfaceConfig::default()
        };
        let controller = MetaSurfaceController::new(
            Box::new(platform.meta_surface),
            &config,
            &SafetyEnvelope::default(),
        )
        .unwrap();
        (controller, handles.meta_surface, clock)
    }

    #[test]
    fn test_quantize_at_reference_temperature() {
        let (meta, _, _) = controller();
        let mut phases = Array2::<f32>::zeros((4, 4));
        phases[[0, 1]] = std::f32::consts::PI;
        phases[[0, 2]] = TAU - 1e-4;
        let drive = meta.quantize(&PhaseMap::new(phases).unwrap(), 25.0);
        assert_eq!(drive[[0, 0]], 0);
        assert_eq!(drive[[0, 1]], 128);
        // Just below 2π wraps to level 0
        assert_eq!(drive[[0, 2]], 0);
    }

    #[test]
    fn test_temperature_compensation_shifts_levels() {
        let (meta, _, _) = controller();
        let phases = Array2::<f32>::from_elem((4, 4), std::f32::consts::PI);
        let map = PhaseMap::new(phases).unwrap();
        // +20 C * 0.002 rad/C = 0.04 rad ≈ 1.6 levels
        let hot = meta.quantize(&map, 45.0);
        let reference = meta.quantize(&map, 25.0);
        assert_eq!(reference[[1, 1]] - hot[[1, 1]], 2);
    }

    #[test]
    fn test_settling_reported() {
        let (mut meta, handle, clock) = controller();
        let map = PhaseMap::new(Array2::from_elem((4, 4), 1.0)).unwrap();
        meta.apply(&map).unwrap();
        assert_eq!(meta.poll_settled(), SettleStatus::NotSettled);
        clock.delay_us(300);
        assert_eq!(meta.poll_settled(), SettleStatus::Settled);

        handle.stall_settling(true);
        assert_eq!(meta.poll_settled(), SettleStatus::NotSettled);
    }

    #[test]
    fn test_thermal_protection_refuses_new_maps() {
        let (mut meta, handle, _) = controller();
        handle.set_temperature_c(48.0);
        let map = PhaseMap::zeros(4, 4);
        assert!(matches!(
            meta.apply(&map),
            Err(ControllerError::OverTemperature { .. })
        ));
        assert_eq!(handle.set_calls(), 0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let (mut meta, _, _) = controller();
        assert!(matches!(
            meta.apply(&PhaseMap::zeros(8, 8)),
            Err(ControllerError::InvalidCommand { .. })
        ));
    }
}
