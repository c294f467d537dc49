// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Holowatch Projector
//!
//! Frame planning and the three hardware-facing controllers.
//!
//! ```text
//! HologramTarget + TelemetrySample + SafetyEnvelope
//!            │
//!            ▼
//!   ProjectionOptimizer ──▶ ActuationPlan
//!                             │ intensity   ──▶ LaserController        (clamp + re-validate)
//!                             │ trajectory  ──▶ MemsController         (tracking, scan epoch)
//!                             │ phase map   ──▶ MetaSurfaceController  (quantize, settle)
//! ```
//!
//! Controllers are invoked synchronously from the frame thread. They never
//! consult the safety state themselves; the kill switches behind their
//! devices are the override path.

pub mod error;
pub mod laser;
pub mod mems;
pub mod meta_surface;
pub mod optimizer;

pub use error::{ControllerError, ControllerResult, OptimizerError};
pub use laser::{ApplyStatus, LaserAck, LaserController};
pub use mems::{focus_distance_mm, raster_trajectory, scan_half_angle_deg, MemsController};
pub use meta_surface::{MetaSurfaceController, SettleStatus};
pub use optimizer::ProjectionOptimizer;
