// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! MEMS controller and scan trajectory generation

use std::f64::consts::PI;
use std::time::Duration;

use holowatch_config::MemsConfig;
use holowatch_hal::{MirrorInterface, ScanEpoch};
use holowatch_structures::{
    ControllerKind, MemsReading, MirrorTrajectory, StructureError, TrajectoryPoint,
};
use tracing::{debug, warn};

use crate::error::{ControllerError, ControllerResult};

/// Closest focus distance the optics support
pub const MIN_FOCUS_MM: f64 = 200.0;

/// Focus distance for a viewer at `viewing_distance_mm`
pub fn focus_distance_mm(viewing_distance_mm: f64) -> f64 {
    (0.9 * viewing_distance_mm).max(MIN_FOCUS_MM)
}

/// Half of the scan angle needed to cover `display_size_mm` at the focus
/// distance, limited to the mirror's mechanical range
pub fn scan_half_angle_deg(
    display_size_mm: f64,
    viewing_distance_mm: f64,
    max_half_angle_deg: f64,
) -> f64 {
    let focus = focus_distance_mm(viewing_distance_mm);
    let full_angle_deg = 2.0 * (display_size_mm / (2.0 * focus)).atan().to_degrees();
    (full_angle_deg / 2.0).min(max_half_angle_deg)
}

/// Bidirectional raster for one frame.
///
/// The fast axis follows the resonant (cosine) sweep and reverses on every
/// line; the slow axis steps linearly from top to bottom. Samples are spread
/// over the active part of the frame period.
pub fn raster_trajectory(
    config: &MemsConfig,
    half_angle_deg: f64,
    frame_period: Duration,
) -> Result<MirrorTrajectory, StructureError> {
    let lines = config.lines.max(1) as usize;
    let samples = config.samples_per_line.max(2) as usize;
    let active_us = frame_period.as_micros() as f64 * config.scan_fill_fraction;
    let dwell_us = ((active_us / (lines * samples) as f64).floor() as u64).max(1);

    let mut points = Vec::with_capacity(lines * samples);
    for line in 0..lines {
        let y_deg = if lines == 1 {
            0.0
        } else {
            half_angle_deg * (2.0 * line as f64 / (lines - 1) as f64 - 1.0)
        };
        let direction = if line % 2 == 0 { 1.0 } else { -1.0 };
        for sample in 0..samples {
            let phase = PI * sample as f64 / (samples - 1) as f64;
            let x_deg = -direction * phase.cos() * half_angle_deg;
            points.push(TrajectoryPoint {
                t_us: (line * samples + sample) as u64 * dwell_us,
                x_deg,
                y_deg,
            });
        }
    }

    MirrorTrajectory::new(points, dwell_us)
}

pub struct MemsController {
    device: Box<dyn MirrorInterface>,
    max_half_angle_deg: f64,
    tolerance_deg: f64,
    fault_cycles: u32,
    timeout_us: u64,
    consecutive_violations: u32,
    last_epoch: Option<ScanEpoch>,
}

impl MemsController {
    pub fn new(device: Box<dyn MirrorInterface>, config: &MemsConfig) -> Self {
        Self {
            device,
            max_half_angle_deg: config.max_scan_half_angle_deg,
            tolerance_deg: config.tracking_tolerance_deg,
            fault_cycles: config.tracking_fault_cycles.max(1),
            timeout_us: config.actuator_timeout_us,
            consecutive_violations: 0,
            last_epoch: None,
        }
    }

    /// Load `trajectory`; returns the scan epoch laser modulation is timed against
    pub fn apply(&mut self, trajectory: &MirrorTrajectory) -> ControllerResult<ScanEpoch> {
        let peak = trajectory.max_abs_angle_deg();
        if peak > self.max_half_angle_deg {
            return Err(ControllerError::InvalidCommand {
                controller: ControllerKind::Mems,
                reason: format!(
                    "trajectory reaches {:.3} deg, mechanical limit {:.3} deg",
                    peak, self.max_half_angle_deg
                ),
            });
        }

        let epoch = self
            .device
            .set_trajectory(trajectory, self.timeout_us)
            .map_err(|e| ControllerError::from_hal(ControllerKind::Mems, e))?;
        debug!(
            "[MEMS] Loaded {} points (dwell {} us), scan epoch {} us",
            trajectory.points().len(),
            trajectory.dwell_us(),
            epoch.start_us
        );
        self.last_epoch = Some(epoch);
        Ok(epoch)
    }

    /// Instantaneous measured angle (x, y) in degrees
    pub fn position(&self) -> (f64, f64) {
        self.device.position()
    }

    pub fn is_settled(&self) -> bool {
        self.device.is_settled()
    }

    pub fn last_epoch(&self) -> Option<ScanEpoch> {
        self.last_epoch
    }

    pub fn consecutive_violations(&self) -> u32 {
        self.consecutive_violations
    }

    pub fn read_telemetry(&self) -> ControllerResult<MemsReading> {
        self.device
            .read_telemetry()
            .map_err(|e| ControllerError::from_hal(ControllerKind::Mems, e))
    }

    /// Read tracking error once per frame.
    ///
    /// Errors above tolerance on `tracking_fault_cycles` consecutive frames
    /// become a [`ControllerError::TrackingFault`]; the reading is returned
    /// otherwise so it can be published.
    pub fn sample_tracking(&mut self) -> ControllerResult<MemsReading> {
        let reading = self.read_telemetry()?;
        let error_deg = reading.position_error_deg.abs();
        // An unreadable error counts against tracking
        if error_deg.is_nan() || error_deg > self.tolerance_deg {
            self.consecutive_violations += 1;
            warn!(
                "[MEMS] Tracking error {:.3} deg above {:.3} deg ({}/{})",
                reading.position_error_deg,
                self.tolerance_deg,
                self.consecutive_violations,
                self.fault_cycles
            );
            if self.consecutive_violations >= self.fault_cycles {
                return Err(ControllerError::TrackingFault {
                    error_deg,
                    tolerance_deg: self.tolerance_deg,
                    cycles: self.consecutive_violations,
                });
            }
        } else {
            self.consecutive_violations = 0;
        }
        Ok(reading)
    }

    pub fn reset_tracking(&mut self) {
        self.consecutive_violations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holowatch_hal::simulated::{SimClock, SimSettings, SimulatedPlatform};
    use std::sync::Arc;

    #[test]
    fn test_scan_angle_from_geometry() {
        // 30 mm at 300 mm viewing distance -> focus 270 mm
        let half = scan_half_angle_deg(30.0, 300.0, 15.0);
        let expected = (15.0f64 / 270.0).atan().to_degrees();
        assert!((half - expected).abs() < 1e-9);

        // Close viewer: focus never below 200 mm
        assert_eq!(focus_distance_mm(100.0), MIN_FOCUS_MM);

        // Huge display: limited by the mirror
        assert_eq!(scan_half_angle_deg(1000.0, 300.0, 15.0), 15.0);
    }

    #[test]
    fn test_raster_is_bidirectional_and_within_frame() {
        let config = MemsConfig {
            lines: 4,
            samples_per_line: 8,
            ..MemsConfig::default()
        };
        let period = Duration::from_micros(16_667);
        let traj = raster_trajectory(&config, 5.0, period).unwrap();
        let points = traj.points();

        assert_eq!(points.len(), 32);
        assert!((points[0].x_deg + 5.0).abs() < 1e-9);
        assert!((points[7].x_deg - 5.0).abs() < 1e-9);
        assert!((points[8].x_deg - 5.0).abs() < 1e-9);
        assert!((points[0].y_deg + 5.0).abs() < 1e-9);
        assert!((points[31].y_deg - 5.0).abs() < 1e-9);
        assert!(traj.duration_us() < period.as_micros() as u64);
        assert!(traj.max_abs_angle_deg() <= 5.0 + 1e-9);
    }

    fn controller() -> (MemsController, holowatch_hal::simulated::SimMirrorHandle) {
        let clock = Arc::new(SimClock::new(0));
        let (platform, handles) = SimulatedPlatform::new(&SimSettings::default(), clock);
        (
            MemsController::new(Box::new(platform.mirror), &MemsConfig::default()),
            handles.mirror,
        )
    }

    #[test]
    fn test_angle_beyond_mechanical_limit_rejected() {
        let (mut mems, handle) = controller();
        let traj = MirrorTrajectory::new(
            vec![TrajectoryPoint {
                t_us: 0,
                x_deg: 20.0,
                y_deg: 0.0,
            }],
            10,
        )
        .unwrap();
        assert!(matches!(
            mems.apply(&traj),
            Err(ControllerError::InvalidCommand { controller: ControllerKind::Mems, .. })
        ));
        assert_eq!(handle.set_calls(), 0);
    }

    #[test]
    fn test_tracking_fault_after_consecutive_violations() {
        let (mut mems, handle) = controller();
        handle.inject_position_error_deg(0.3);

        assert!(mems.sample_tracking().is_ok());
        let err = mems.sample_tracking().unwrap_err();
        assert!(matches!(err, ControllerError::TrackingFault { cycles: 2, .. }));
    }

    #[test]
    fn test_tracking_violations_reset_on_good_frame() {
        let (mut mems, handle) = controller();
        handle.inject_position_error_deg(0.3);
        mems.sample_tracking().unwrap();
        handle.inject_position_error_deg(0.02);
        mems.sample_tracking().unwrap();
        assert_eq!(mems.consecutive_violations(), 0);
        handle.inject_position_error_deg(0.3);
        assert!(mems.sample_tracking().is_ok());
    }

    #[test]
    fn test_unreadable_tracking_error_counts_as_violation() {
        let (mut mems, handle) = controller();
        handle.inject_position_error_deg(0.3);
        mems.sample_tracking().unwrap();

        handle.inject_position_error_deg(f64::NAN);
        let err = mems.sample_tracking().unwrap_err();
        assert!(matches!(err, ControllerError::TrackingFault { cycles: 2, .. }));
    }
}
