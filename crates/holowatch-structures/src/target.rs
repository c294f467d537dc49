// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-frame hologram target descriptor.

use ndarray::Array2;

use crate::StructureError;

/// Desired light field for one frame.
///
/// Supplied by an external content source. Fields are private so a target
/// cannot change after it has been handed to the optimizer.
#[derive(Debug, Clone)]
pub struct HologramTarget {
    frame_id: u64,
    depth_mm: Array2<f32>,
    amplitude: Array2<f32>,
    phase: Array2<f32>,
    luminance: f64,
    color_mix: Vec<f64>,
    viewing_distance_mm: f64,
    display_size_mm: f64,
}

impl HologramTarget {
    /// Build a target from depth, normalized amplitude and phase (radians) maps.
    ///
    /// Defaults: full luminance, white mix over `channels`, 300 mm viewing
    /// distance, 30 mm display.
    pub fn new(
        frame_id: u64,
        depth_mm: Array2<f32>,
        amplitude: Array2<f32>,
        phase: Array2<f32>,
        channels: usize,
    ) -> Result<Self, StructureError> {
        if amplitude.is_empty() {
            return Err(StructureError::BadParameters(
                "amplitude map must not be empty".to_string(),
            ));
        }
        if channels == 0 {
            return Err(StructureError::BadParameters(
                "target needs at least one color channel".to_string(),
            ));
        }
        let expected = amplitude.dim();
        for (what, map) in [("phase", &phase), ("depth", &depth_mm)] {
            if map.dim() != expected {
                return Err(StructureError::DimensionMismatch {
                    what,
                    expected,
                    actual: map.dim(),
                });
            }
        }
        if amplitude.iter().any(|a| !a.is_finite() || *a < 0.0 || *a > 1.0) {
            return Err(StructureError::OutOfRange(
                "amplitude values must lie in [0, 1]".to_string(),
            ));
        }
        if phase.iter().any(|p| !p.is_finite()) || depth_mm.iter().any(|d| !d.is_finite()) {
            return Err(StructureError::BadParameters(
                "phase and depth maps must be finite".to_string(),
            ));
        }

        Ok(Self {
            frame_id,
            depth_mm,
            amplitude,
            phase,
            luminance: 1.0,
            color_mix: vec![1.0; channels],
            viewing_distance_mm: 300.0,
            display_size_mm: 30.0,
        })
    }

    /// Flat target with constant amplitude and zero phase, mostly for tests and tooling
    pub fn uniform(
        frame_id: u64,
        rows: usize,
        cols: usize,
        amplitude: f32,
        channels: usize,
    ) -> Result<Self, StructureError> {
        Self::new(
            frame_id,
            Array2::zeros((rows, cols)),
            Array2::from_elem((rows, cols), amplitude),
            Array2::zeros((rows, cols)),
            channels,
        )
    }

    /// Requested luminance relative to full scale
    pub fn with_luminance(mut self, luminance: f64) -> Result<Self, StructureError> {
        if !(0.0..=1.0).contains(&luminance) {
            return Err(StructureError::OutOfRange(format!(
                "luminance must lie in [0, 1], got {}",
                luminance
            )));
        }
        self.luminance = luminance;
        Ok(self)
    }

    /// Per-channel color weights, one per laser channel
    pub fn with_color_mix(mut self, mix: Vec<f64>) -> Result<Self, StructureError> {
        if mix.len() != self.color_mix.len() {
            return Err(StructureError::BadParameters(format!(
                "color mix has {} channels, target has {}",
                mix.len(),
                self.color_mix.len()
            )));
        }
        if mix.iter().any(|m| !(0.0..=1.0).contains(m)) {
            return Err(StructureError::OutOfRange(
                "color mix weights must lie in [0, 1]".to_string(),
            ));
        }
        self.color_mix = mix;
        Ok(self)
    }

    pub fn with_geometry(
        mut self,
        viewing_distance_mm: f64,
        display_size_mm: f64,
    ) -> Result<Self, StructureError> {
        if !(viewing_distance_mm > 0.0 && display_size_mm > 0.0) {
            return Err(StructureError::OutOfRange(
                "viewing distance and display size must be positive".to_string(),
            ));
        }
        self.viewing_distance_mm = viewing_distance_mm;
        self.display_size_mm = display_size_mm;
        Ok(self)
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn depth_mm(&self) -> &Array2<f32> {
        &self.depth_mm
    }

    pub fn amplitude(&self) -> &Array2<f32> {
        &self.amplitude
    }

    pub fn phase(&self) -> &Array2<f32> {
        &self.phase
    }

    pub fn luminance(&self) -> f64 {
        self.luminance
    }

    pub fn color_mix(&self) -> &[f64] {
        &self.color_mix
    }

    pub fn channel_count(&self) -> usize {
        self.color_mix.len()
    }

    pub fn viewing_distance_mm(&self) -> f64 {
        self.viewing_distance_mm
    }

    pub fn display_size_mm(&self) -> f64 {
        self.display_size_mm
    }

    /// Mean normalized amplitude over the whole map
    pub fn mean_amplitude(&self) -> f64 {
        self.amplitude.iter().map(|a| *a as f64).sum::<f64>() / self.amplitude.len() as f64
    }

    /// Intensity each channel needs to reach the requested luminance at full quality
    pub fn required_intensity(&self) -> Vec<f64> {
        let base = self.luminance * self.mean_amplitude();
        self.color_mix.iter().map(|m| base * m).collect()
    }
}
