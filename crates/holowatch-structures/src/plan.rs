// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Actuation plan: the command triple for one frame.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{wrap_phase, StructureError};

/// Per-channel laser intensity, each entry in `[0, 1]` of channel full scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityVector(Vec<f64>);

impl IntensityVector {
    pub fn new(values: Vec<f64>) -> Result<Self, StructureError> {
        if values.is_empty() {
            return Err(StructureError::BadParameters(
                "intensity vector must have at least one channel".to_string(),
            ));
        }
        if let Some((i, v)) = values
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0 || **v > 1.0)
        {
            return Err(StructureError::OutOfRange(format!(
                "channel {} intensity {} outside [0, 1]",
                i, v
            )));
        }
        Ok(Self(values))
    }

    pub fn zeros(channels: usize) -> Self {
        Self(vec![0.0; channels])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Optical power per channel given each channel's full-scale power
    pub fn channel_power_w(&self, full_scale_w: &[f64]) -> Vec<f64> {
        self.0
            .iter()
            .zip(full_scale_w)
            .map(|(i, fs)| i * fs)
            .collect()
    }

    /// Aggregate optical power given each channel's full-scale power
    pub fn power_w(&self, full_scale_w: &[f64]) -> f64 {
        self.0.iter().zip(full_scale_w).map(|(i, fs)| i * fs).sum()
    }
}

/// One mirror set-point: time offset from scan start and two-axis angle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub t_us: u64,
    pub x_deg: f64,
    pub y_deg: f64,
}

/// Ordered angle/time pairs spanning one scan.
///
/// Timestamps are strictly increasing. `dwell_us` is the per-pixel dwell the
/// laser modulation is co-timed against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorTrajectory {
    points: Vec<TrajectoryPoint>,
    dwell_us: u64,
}

impl MirrorTrajectory {
    pub fn new(points: Vec<TrajectoryPoint>, dwell_us: u64) -> Result<Self, StructureError> {
        if points.is_empty() {
            return Err(StructureError::BadParameters(
                "trajectory must contain at least one point".to_string(),
            ));
        }
        if dwell_us == 0 {
            return Err(StructureError::BadParameters(
                "trajectory dwell must be non-zero".to_string(),
            ));
        }
        if points
            .iter()
            .any(|p| !p.x_deg.is_finite() || !p.y_deg.is_finite())
        {
            return Err(StructureError::BadParameters(
                "trajectory angles must be finite".to_string(),
            ));
        }
        if let Some(w) = points.windows(2).find(|w| w[1].t_us <= w[0].t_us) {
            return Err(StructureError::BadParameters(format!(
                "trajectory timestamps must strictly increase ({} -> {})",
                w[0].t_us, w[1].t_us
            )));
        }
        Ok(Self { points, dwell_us })
    }

    /// Mirror held at center, used for blank frames
    pub fn parked(dwell_us: u64) -> Self {
        Self {
            points: vec![TrajectoryPoint {
                t_us: 0,
                x_deg: 0.0,
                y_deg: 0.0,
            }],
            dwell_us: dwell_us.max(1),
        }
    }

    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }

    pub fn dwell_us(&self) -> u64 {
        self.dwell_us
    }

    pub fn duration_us(&self) -> u64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.t_us - first.t_us,
            _ => 0,
        }
    }

    /// Largest absolute deflection on either axis
    pub fn max_abs_angle_deg(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.x_deg.abs().max(p.y_deg.abs()))
            .fold(0.0, f64::max)
    }

    /// Commanded angle at `t_us`, linearly interpolated and clamped to the scan span
    pub fn position_at(&self, t_us: u64) -> (f64, f64) {
        let idx = self.points.partition_point(|p| p.t_us <= t_us);
        if idx == 0 {
            let p = self.points[0];
            return (p.x_deg, p.y_deg);
        }
        if idx >= self.points.len() {
            let p = self.points[self.points.len() - 1];
            return (p.x_deg, p.y_deg);
        }
        let a = self.points[idx - 1];
        let b = self.points[idx];
        let frac = (t_us - a.t_us) as f64 / (b.t_us - a.t_us) as f64;
        (
            a.x_deg + (b.x_deg - a.x_deg) * frac,
            a.y_deg + (b.y_deg - a.y_deg) * frac,
        )
    }
}

/// Per-element phase in radians on the meta-surface grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMap(Array2<f32>);

impl PhaseMap {
    pub fn new(phases: Array2<f32>) -> Result<Self, StructureError> {
        if phases.is_empty() {
            return Err(StructureError::BadParameters(
                "phase map must not be empty".to_string(),
            ));
        }
        if phases.iter().any(|p| !p.is_finite()) {
            return Err(StructureError::BadParameters(
                "phase map values must be finite".to_string(),
            ));
        }
        Ok(Self(phases.mapv(wrap_phase)))
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self(Array2::zeros((rows, cols)))
    }

    pub fn phases(&self) -> &Array2<f32> {
        &self.0
    }

    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }
}

/// Command triple computed by the optimizer for one frame.
///
/// Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuationPlan {
    frame_id: u64,
    intensity: IntensityVector,
    trajectory: MirrorTrajectory,
    phase_map: PhaseMap,
    predicted_power_w: f64,
    quality_confidence: f64,
    converged: bool,
    iterations: u32,
}

impl ActuationPlan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frame_id: u64,
        intensity: IntensityVector,
        trajectory: MirrorTrajectory,
        phase_map: PhaseMap,
        predicted_power_w: f64,
        quality_confidence: f64,
        converged: bool,
        iterations: u32,
    ) -> Self {
        Self {
            frame_id,
            intensity,
            trajectory,
            phase_map,
            predicted_power_w,
            quality_confidence: quality_confidence.clamp(0.0, 1.0),
            converged,
            iterations,
        }
    }

    /// Zero-emission plan: dark laser, parked mirror, flat phase
    pub fn blank(frame_id: u64, channels: usize, rows: usize, cols: usize) -> Self {
        Self {
            frame_id,
            intensity: IntensityVector::zeros(channels),
            trajectory: MirrorTrajectory::parked(1),
            phase_map: PhaseMap::zeros(rows, cols),
            predicted_power_w: 0.0,
            quality_confidence: 0.0,
            converged: true,
            iterations: 0,
        }
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn intensity(&self) -> &IntensityVector {
        &self.intensity
    }

    pub fn trajectory(&self) -> &MirrorTrajectory {
        &self.trajectory
    }

    pub fn phase_map(&self) -> &PhaseMap {
        &self.phase_map
    }

    /// Laser optical power plus actuator drive power the plan is expected to draw
    pub fn predicted_power_w(&self) -> f64 {
        self.predicted_power_w
    }

    /// 1.0 means the target is rendered as requested and the solver converged
    pub fn quality_confidence(&self) -> f64 {
        self.quality_confidence
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn is_blank(&self) -> bool {
        self.intensity.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(t_us: u64, x_deg: f64, y_deg: f64) -> TrajectoryPoint {
        TrajectoryPoint { t_us, x_deg, y_deg }
    }

    #[test]
    fn test_intensity_bounds() {
        assert!(IntensityVector::new(vec![0.0, 1.0, 0.5]).is_ok());
        assert!(IntensityVector::new(vec![0.5, 1.01]).is_err());
        assert!(IntensityVector::new(vec![f64::NAN]).is_err());
        assert!(IntensityVector::new(vec![]).is_err());
    }

    #[test]
    fn test_intensity_power() {
        let v = IntensityVector::new(vec![0.5, 0.25]).unwrap();
        assert!((v.power_w(&[1.0, 2.0]) - 1.0).abs() < 1e-12);
        assert_eq!(v.channel_power_w(&[1.0, 2.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn test_trajectory_requires_increasing_time() {
        let err = MirrorTrajectory::new(vec![pt(0, 0.0, 0.0), pt(0, 1.0, 0.0)], 10);
        assert!(err.is_err());
        assert!(MirrorTrajectory::new(vec![], 10).is_err());
    }

    #[test]
    fn test_trajectory_interpolation() {
        let traj =
            MirrorTrajectory::new(vec![pt(0, -2.0, 1.0), pt(100, 2.0, 1.0), pt(200, 2.0, -1.0)], 10)
                .unwrap();
        assert_eq!(traj.position_at(50), (0.0, 1.0));
        assert_eq!(traj.position_at(150), (2.0, 0.0));
        assert_eq!(traj.position_at(10_000), (2.0, -1.0));
        assert_eq!(traj.duration_us(), 200);
        assert_eq!(traj.max_abs_angle_deg(), 2.0);
    }

    #[test]
    fn test_phase_map_wraps() {
        let map = PhaseMap::new(Array2::from_elem((2, 2), -core::f32::consts::FRAC_PI_2)).unwrap();
        let expected = 1.5 * core::f32::consts::PI;
        assert!(map.phases().iter().all(|p| (p - expected).abs() < 1e-5));
    }

    #[test]
    fn test_blank_plan() {
        let plan = ActuationPlan::blank(3, 3, 4, 4);
        assert!(plan.is_blank());
        assert_eq!(plan.predicted_power_w(), 0.0);
        assert_eq!(plan.phase_map().dim(), (4, 4));
    }
}
