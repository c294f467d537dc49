// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Projection Optimizer
//!
//! Computes one [`ActuationPlan`] per frame from a [`HologramTarget`], the
//! latest [`TelemetrySample`] and the [`SafetyEnvelope`].
//!
//! ## Intensity
//!
//! Per channel `c` the target asks for `r_c = luminance * mix_c * mean(amplitude)`.
//! The solver minimizes
//!
//! ```text
//! J(i) = wq * |i - r|² / |r|²                      (image quality)
//!      + wp * P(i) / P_max                         (energy)
//!      + wb * max(0, P(i) + P_drive - P_avail)² / P_max²   (soft power budget)
//!      + wt * |i - i_prev|²                        (temporal coherence, warm start)
//! ```
//!
//! `P_avail` is the reported power budget, derated linearly to zero as the
//! thermal headroom falls below `thermal_derate_headroom_c`. A missing power
//! sample means zero budget and zero headroom.
//!
//! The solver runs projected gradient descent over the hard box
//! `min_luminance * r_c <= i_c <= min(1, P_channel / full_scale_c)` and
//! `P(i) <= P_max`. Every iterate is projected, so the best plan found so far
//! is always in bounds and can be returned when the deadline hits.
//!
//! ## Phase
//!
//! The phase map is the target phase resampled onto the meta-surface grid
//! plus a Fresnel lens term focusing each element at its target depth.
//! Elements whose change from the warm-start map is below one drive level
//! keep their previous value.
//!
//! ## Infeasibility
//!
//! Under either policy a target is infeasible when even the minimum-quality
//! box does not fit the envelope. Under [`InfeasibilityPolicy::Fail`] it is
//! also infeasible when the unclamped request breaches a ceiling.

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use holowatch_config::{
    HolowatchConfig, InfeasibilityPolicy, MemsConfig, OptimizerConfig, SafetyEnvelope,
};
use holowatch_structures::{
    ActuationPlan, HologramTarget, IntensityVector, PhaseMap, TelemetrySample,
};
use ndarray::{Array2, Zip};
use tracing::{debug, trace, warn};

use crate::error::OptimizerError;
use crate::mems::{focus_distance_mm, raster_trajectory, scan_half_angle_deg};

/// Confidence multiplier for a plan cut short by the deadline
const UNCONVERGED_CONFIDENCE: f64 = 0.9;

/// Backtracking gives up below this step
const MIN_STEP: f64 = 1e-12;

/// Previous presented plan, kept to seed the next solve
#[derive(Debug, Clone)]
struct WarmStart {
    frame_id: u64,
    intensity: Vec<f64>,
    phase: Array2<f32>,
}

/// Hard bounds on the intensity vector for one frame
#[derive(Debug, Clone)]
struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
    full_scale_w: Vec<f64>,
    max_power_w: f64,
}

impl Bounds {
    fn power_w(&self, intensity: &[f64]) -> f64 {
        intensity.iter().zip(&self.full_scale_w).map(|(i, fs)| i * fs).sum()
    }

    /// Clamp to the box, then shrink the part above the floor until the
    /// aggregate fits
    fn project(&self, intensity: &mut [f64]) {
        for ((v, lo), hi) in intensity.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.clamp(*lo, *hi);
        }
        let floor_w = self.power_w(&self.lower);
        let total_w = self.power_w(intensity);
        if total_w > self.max_power_w {
            let excess_w = total_w - floor_w;
            // Stay strictly below the ceiling after rounding
            let scale = ((self.max_power_w - floor_w) / excess_w * (1.0 - 1e-9)).max(0.0);
            for (v, lo) in intensity.iter_mut().zip(&self.lower) {
                *v = lo + (*v - lo) * scale;
            }
        }
    }
}

/// Objective terms for one frame
struct Objective<'a> {
    config: &'a OptimizerConfig,
    required: &'a [f64],
    previous: Option<&'a [f64]>,
    bounds: &'a Bounds,
    drive_power_w: f64,
    available_power_w: f64,
    quality_norm: f64,
}

impl Objective<'_> {
    fn value(&self, i: &[f64]) -> f64 {
        let c = self.config;
        let p_max = self.bounds.max_power_w;
        let power = self.bounds.power_w(i);

        let quality: f64 = i
            .iter()
            .zip(self.required)
            .map(|(v, r)| (v - r).powi(2))
            .sum::<f64>()
            / self.quality_norm;
        let over_budget = (power + self.drive_power_w - self.available_power_w).max(0.0);
        let temporal: f64 = self.previous.map_or(0.0, |prev| {
            i.iter().zip(prev).map(|(v, p)| (v - p).powi(2)).sum()
        });

        c.quality_weight * quality
            + c.power_weight * power / p_max
            + c.budget_penalty_weight * over_budget.powi(2) / (p_max * p_max)
            + c.temporal_coherence_weight * temporal
    }

    fn gradient(&self, i: &[f64]) -> Vec<f64> {
        let c = self.config;
        let p_max = self.bounds.max_power_w;
        let power = self.bounds.power_w(i);
        let over_budget = (power + self.drive_power_w - self.available_power_w).max(0.0);

        (0..i.len())
            .map(|k| {
                let fs = self.bounds.full_scale_w[k];
                let mut g = c.quality_weight * 2.0 * (i[k] - self.required[k]) / self.quality_norm
                    + c.power_weight * fs / p_max
                    + c.budget_penalty_weight * 2.0 * over_budget * fs / (p_max * p_max);
                if let Some(prev) = self.previous {
                    g += c.temporal_coherence_weight * 2.0 * (i[k] - prev[k]);
                }
                g
            })
            .collect()
    }
}

/// Power budget scaled by the remaining thermal headroom
fn derated_budget_w(telemetry: &TelemetrySample, full_budget_headroom_c: f64) -> f64 {
    let headroom = telemetry.thermal_headroom_c;
    let derate = if headroom.is_nan() || headroom <= 0.0 {
        0.0
    } else {
        (headroom / full_budget_headroom_c).min(1.0)
    };
    if derate < 1.0 {
        trace!(
            "[OPTIMIZER] Thermal headroom {:.2} C derates budget to {:.0}%",
            headroom,
            derate * 100.0
        );
    }
    telemetry.available_power_w.max(0.0) * derate
}

/// Result of the intensity solve
#[derive(Debug, Clone)]
struct IntensitySolution {
    intensity: Vec<f64>,
    objective: f64,
    iterations: u32,
    converged: bool,
}

pub struct ProjectionOptimizer {
    config: OptimizerConfig,
    full_scale_w: Vec<f64>,
    mean_wavelength_nm: f64,
    mems: MemsConfig,
    element_pitch_um: f64,
    grid: (usize, usize),
    phase_levels: u32,
    drive_power_base_w: f64,
    frame_period: Duration,
    budget: Duration,
    warm_start: Option<WarmStart>,
}

impl ProjectionOptimizer {
    pub fn new(config: &HolowatchConfig) -> Self {
        Self {
            config: config.optimizer.clone(),
            full_scale_w: config.laser.channel_full_scale_w.clone(),
            mean_wavelength_nm: config.laser.mean_wavelength_nm(),
            mems: config.mems.clone(),
            element_pitch_um: config.meta_surface.element_pitch_um,
            grid: (config.meta_surface.rows, config.meta_surface.cols),
            phase_levels: config.meta_surface.phase_levels.max(2),
            drive_power_base_w: config.meta_surface.drive_power_w,
            frame_period: config.frame_period(),
            budget: config.optimizer_budget(),
            warm_start: None,
        }
    }

    pub fn policy(&self) -> InfeasibilityPolicy {
        self.config.infeasibility_policy
    }

    /// Time allowed per solve
    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn channel_count(&self) -> usize {
        self.full_scale_w.len()
    }

    /// Meta-surface grid (rows, cols)
    pub fn grid(&self) -> (usize, usize) {
        self.grid
    }

    /// Frame whose plan currently seeds the solver
    pub fn warm_start_frame(&self) -> Option<u64> {
        self.warm_start.as_ref().map(|w| w.frame_id)
    }

    /// Record the plan that was actually presented
    pub fn accept_presented(&mut self, plan: &ActuationPlan) {
        if plan.is_blank() {
            return;
        }
        self.warm_start = Some(WarmStart {
            frame_id: plan.frame_id(),
            intensity: plan.intensity().as_slice().to_vec(),
            phase: plan.phase_map().phases().clone(),
        });
    }

    pub fn clear_warm_start(&mut self) {
        self.warm_start = None;
    }

    /// Plan `target` within the configured time budget
    pub fn compute_plan(
        &self,
        target: &HologramTarget,
        telemetry: &TelemetrySample,
        envelope: &SafetyEnvelope,
    ) -> Result<ActuationPlan, OptimizerError> {
        self.compute_plan_until(target, telemetry, envelope, Instant::now() + self.budget)
    }

    /// Plan `target`, returning the best plan found when `deadline` passes
    pub fn compute_plan_until(
        &self,
        target: &HologramTarget,
        telemetry: &TelemetrySample,
        envelope: &SafetyEnvelope,
        deadline: Instant,
    ) -> Result<ActuationPlan, OptimizerError> {
        if target.channel_count() != self.channel_count() {
            return Err(OptimizerError::InvalidTarget(format!(
                "target has {} color channels, laser drives {}",
                target.channel_count(),
                self.channel_count()
            )));
        }

        let required = target.required_intensity();
        let bounds = self.bounds(target.frame_id(), &required, envelope)?;

        let half_angle = scan_half_angle_deg(
            target.display_size_mm(),
            target.viewing_distance_mm(),
            self.mems.max_scan_half_angle_deg,
        );
        let drive_power_w =
            self.drive_power_base_w + self.mems.drive_power_w_per_deg2 * half_angle * half_angle;

        let solution = self.solve_intensity(&required, &bounds, drive_power_w, telemetry, deadline);
        let (phase, phase_fidelity) = self.solve_phase(target);
        let trajectory = raster_trajectory(&self.mems, half_angle, self.frame_period)?;

        let laser_power_w = bounds.power_w(&solution.intensity);
        let brightness_fidelity = intensity_fidelity(&solution.intensity, &required);
        let convergence = if solution.converged {
            1.0
        } else {
            UNCONVERGED_CONFIDENCE
        };
        let confidence = brightness_fidelity * phase_fidelity * convergence;

        if brightness_fidelity < 0.99 {
            warn!(
                "[OPTIMIZER] Frame {} rendered at reduced quality: {:.3} W of {:.3} W requested",
                target.frame_id(),
                laser_power_w,
                bounds.power_w(&required)
            );
        }
        debug!(
            "[OPTIMIZER] Frame {}: {:.3} W laser + {:.3} W drive, J={:.5}, {} iterations, converged={}, confidence={:.3}",
            target.frame_id(),
            laser_power_w,
            drive_power_w,
            solution.objective,
            solution.iterations,
            solution.converged,
            confidence
        );

        Ok(ActuationPlan::new(
            target.frame_id(),
            IntensityVector::new(solution.intensity)?,
            trajectory,
            PhaseMap::new(phase)?,
            laser_power_w + drive_power_w,
            confidence,
            solution.converged,
            solution.iterations,
        ))
    }

    fn bounds(
        &self,
        frame_id: u64,
        required: &[f64],
        envelope: &SafetyEnvelope,
    ) -> Result<Bounds, OptimizerError> {
        let infeasible = |reason: String| OptimizerError::InfeasibleTarget { frame_id, reason };

        let upper: Vec<f64> = self
            .full_scale_w
            .iter()
            .map(|fs| (envelope.max_channel_power_w / fs).min(1.0))
            .collect();
        let lower: Vec<f64> = required
            .iter()
            .map(|r| r * self.config.min_luminance_fraction)
            .collect();
        let bounds = Bounds {
            lower,
            upper,
            full_scale_w: self.full_scale_w.clone(),
            max_power_w: envelope.max_aggregate_laser_power_w,
        };

        if let Some(c) = (0..required.len()).find(|&c| bounds.lower[c] > bounds.upper[c]) {
            return Err(infeasible(format!(
                "channel {} needs {:.3} W at minimum quality, limit {:.3} W",
                c,
                bounds.lower[c] * self.full_scale_w[c],
                envelope.max_channel_power_w
            )));
        }
        let floor_w = bounds.power_w(&bounds.lower);
        if floor_w > bounds.max_power_w {
            return Err(infeasible(format!(
                "{:.3} W needed at minimum quality, limit {:.3} W",
                floor_w, bounds.max_power_w
            )));
        }

        if self.config.infeasibility_policy == InfeasibilityPolicy::Fail {
            if let Some(c) = (0..required.len()).find(|&c| required[c] > bounds.upper[c]) {
                return Err(infeasible(format!(
                    "channel {} requests {:.3} W, limit {:.3} W",
                    c,
                    required[c] * self.full_scale_w[c],
                    envelope.max_channel_power_w
                )));
            }
            let requested_w = bounds.power_w(required);
            if requested_w > bounds.max_power_w {
                return Err(infeasible(format!(
                    "{:.3} W requested, limit {:.3} W",
                    requested_w, bounds.max_power_w
                )));
            }
        }

        Ok(bounds)
    }

    fn solve_intensity(
        &self,
        required: &[f64],
        bounds: &Bounds,
        drive_power_w: f64,
        telemetry: &TelemetrySample,
        deadline: Instant,
    ) -> IntensitySolution {
        let previous = self
            .warm_start
            .as_ref()
            .map(|w| w.intensity.as_slice())
            .filter(|prev| prev.len() == required.len());
        let objective = Objective {
            config: &self.config,
            required,
            previous,
            bounds,
            drive_power_w,
            available_power_w: derated_budget_w(telemetry, self.config.thermal_derate_headroom_c),
            quality_norm: required.iter().map(|r| r * r).sum::<f64>().max(1e-6),
        };

        let mut current = previous.unwrap_or(required).to_vec();
        bounds.project(&mut current);
        let mut current_j = objective.value(&current);
        let mut best = IntensitySolution {
            intensity: current.clone(),
            objective: current_j,
            iterations: 0,
            converged: false,
        };

        let mut step = self.config.step_size;
        for iteration in 1..=self.config.max_iterations {
            if Instant::now() >= deadline {
                debug!(
                    "[OPTIMIZER] Deadline reached after {} iterations",
                    iteration - 1
                );
                return best;
            }

            let gradient = objective.gradient(&current);
            let mut candidate: Vec<f64> = current
                .iter()
                .zip(&gradient)
                .map(|(v, g)| v - step * g)
                .collect();
            bounds.project(&mut candidate);
            let candidate_j = objective.value(&candidate);
            best.iterations = iteration;

            if candidate_j > current_j {
                step *= 0.5;
                if step < MIN_STEP {
                    best.converged = true;
                    return best;
                }
                continue;
            }

            let improvement = current_j - candidate_j;
            let better = candidate_j < best.objective - self.config.convergence_tolerance
                || (candidate_j <= best.objective + self.config.convergence_tolerance
                    && bounds.power_w(&candidate) < bounds.power_w(&best.intensity));
            if better {
                best.intensity = candidate.clone();
                best.objective = candidate_j;
            }
            trace!(
                "[OPTIMIZER] iteration {}: J={:.6} step={:.3e}",
                iteration,
                candidate_j,
                step
            );

            current = candidate;
            current_j = candidate_j;
            if improvement <= self.config.convergence_tolerance * current_j.abs().max(1.0) {
                best.converged = true;
                return best;
            }
        }
        best
    }

    /// Returns the phase map and how closely it matches the ideal wavefront
    fn solve_phase(&self, target: &HologramTarget) -> (Array2<f32>, f64) {
        let (rows, cols) = self.grid;
        let source_phase = target.phase();
        let source_depth = target.depth_mm();
        let (src_rows, src_cols) = source_phase.dim();

        let default_focus_mm = focus_distance_mm(target.viewing_distance_mm());
        let wavelength_mm = self.mean_wavelength_nm * 1e-6;
        let pitch_mm = self.element_pitch_um * 1e-3;
        let center = ((rows as f64 - 1.0) / 2.0, (cols as f64 - 1.0) / 2.0);
        let previous = self
            .warm_start
            .as_ref()
            .map(|w| &w.phase)
            .filter(|p| p.dim() == (rows, cols));
        let hold_threshold = std::f32::consts::TAU / self.phase_levels as f32;

        let mut goal = Array2::<f32>::zeros((rows, cols));
        Zip::indexed(&mut goal).par_for_each(|(r, c), out| {
            let sr = r * src_rows / rows;
            let sc = c * src_cols / cols;
            let depth = source_depth[[sr, sc]] as f64;
            let focus_mm = if depth > 0.0 { depth } else { default_focus_mm };

            let dy = (r as f64 - center.0) * pitch_mm;
            let dx = (c as f64 - center.1) * pitch_mm;
            let lens = -PI * (dx * dx + dy * dy) / (wavelength_mm * focus_mm);
            *out = holowatch_structures::wrap_phase(source_phase[[sr, sc]] + lens as f32);
        });

        let mut phase = goal.clone();
        if let Some(prev) = previous {
            Zip::from(&mut phase).and(prev).par_for_each(|p, old| {
                if circular_distance(*p, *old) < hold_threshold {
                    *p = *old;
                }
            });
        }

        let mismatch = Zip::from(&phase)
            .and(&goal)
            .fold(0.0f64, |acc, p, g| acc + circular_distance(*p, *g) as f64);
        let fidelity = 1.0 - mismatch / (goal.len() as f64 * PI);
        (phase, fidelity.clamp(0.0, 1.0))
    }
}

/// Shortest angular distance between two wrapped phases, in `[0, π]`
fn circular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).abs() % std::f32::consts::TAU;
    d.min(std::f32::consts::TAU - d)
}

/// 1 when `intensity` matches `required`, falling with relative error
fn intensity_fidelity(intensity: &[f64], required: &[f64]) -> f64 {
    let norm: f64 = required.iter().map(|r| r * r).sum::<f64>().sqrt();
    if norm < 1e-12 {
        return 1.0;
    }
    let error: f64 = intensity
        .iter()
        .zip(required)
        .map(|(i, r)| (i - r).powi(2))
        .sum::<f64>()
        .sqrt();
    (1.0 - error / norm).clamp(0.0, 1.0)
}
