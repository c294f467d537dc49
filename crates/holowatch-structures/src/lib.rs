// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core data types shared by every Holowatch crate.
//!
//! Targets and plans are immutable once built; the pipeline passes them
//! around behind `Arc` and computes a fresh plan for every frame instead of
//! editing an old one.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod error;
pub mod plan;
pub mod safety;
pub mod target;
pub mod telemetry;

pub use error::StructureError;
pub use plan::{ActuationPlan, IntensityVector, MirrorTrajectory, PhaseMap, TrajectoryPoint};
pub use safety::{ControllerKind, FaultCause, SafetyState, SafetyStatus};
pub use target::HologramTarget;
pub use telemetry::{
    LaserReading, MemsReading, MetaSurfaceReading, PowerReading, TelemetrySample,
};

/// Wrap a phase in radians into `[0, 2π)`
pub fn wrap_phase(phase: f32) -> f32 {
    let tau = core::f32::consts::TAU;
    let wrapped = phase.rem_euclid(tau);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= tau {
        0.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::f32::consts::{PI, TAU};

    #[test]
    fn test_wrap_phase() {
        assert!((wrap_phase(-PI) - PI).abs() < 1e-6);
        assert!((wrap_phase(3.0 * TAU + 0.5) - 0.5).abs() < 1e-4);
        assert!(wrap_phase(-1e-9) < TAU);
        assert_eq!(wrap_phase(0.0), 0.0);
    }
}
