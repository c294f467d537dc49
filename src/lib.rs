// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Holowatch - Wearable Holographic Display Core
//!
//! Drives a laser source, a 2-axis MEMS scanning mirror and a programmable
//! meta-surface in lockstep to project holographic frames, under a safety
//! interlock that can force laser output to zero at any time.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! holowatch = "0.1"
//! ```
//!
//! ## Feature Flags
//!
//! - **`platform-std`** (default): Standard Rust targets
//! - **`simulated-platform`** (default): Software device models with fault injection
//! - **`file-logging`**: Rolling per-crate log files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use holowatch::prelude::*;
//! use holowatch::hal::simulated::{SimClock, SimSettings, SimulatedPlatform};
//!
//! let config = HolowatchConfig::default();
//! let clock: Arc<dyn TimeProvider> = Arc::new(SimClock::new(0));
//! let settings = SimSettings::default();
//! let (platform, _handles) = SimulatedPlatform::new(&settings, clock.clone());
//!
//! let devices = DeviceSet {
//!     kill_switches: vec![
//!         platform.laser.kill_switch(),
//!         platform.mirror.kill_switch(),
//!         platform.meta_surface.kill_switch(),
//!     ],
//!     laser: Box::new(platform.laser),
//!     mirror: Box::new(platform.mirror),
//!     meta_surface: Box::new(platform.meta_surface),
//!     power: Arc::new(platform.power),
//! };
//! let mut core = DisplayCore::assemble(&config, devices, clock)?;
//! core.scheduler().lock().start()?;
//! core.start_threads()?;
//! core.targets().push(HologramTarget::uniform(1, 32, 32, 0.5, 3)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: holowatch-config, holowatch-structures     │
//! │  (Configuration, targets, plans, telemetry, faults)     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Platform: holowatch-hal                                │
//! │  (Actuator traits, kill switches, simulated devices)    │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Infrastructure: holowatch-state-manager                │
//! │  (Safety interlock, atomic state, telemetry board)      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: holowatch-projector                        │
//! │  (Projection optimizer, actuator controllers)           │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Runtime: holowatch-frame-engine                        │
//! │  (Frame scheduler, dispatch join, loop + watchdog)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

pub use holowatch_config as config;
pub use holowatch_frame_engine as frame_engine;
pub use holowatch_hal as hal;
pub use holowatch_observability as observability;
pub use holowatch_projector as projector;
pub use holowatch_state_manager as state_manager;
pub use holowatch_structures as structures;

/// Common imports
pub mod prelude {
    pub use crate::config::{
        load_config, validate_config, HolowatchConfig, InfeasibilityPolicy,
        InfeasibleFramePolicy, SafetyEnvelope,
    };
    pub use crate::frame_engine::{
        CycleOutcome, DeviceSet, DisplayCore, FrameScheduler, PlanSource, StatusReport,
        TargetQueue,
    };
    pub use crate::hal::{KillSwitch, PowerTelemetrySource, TimeProvider};
    pub use crate::projector::ProjectionOptimizer;
    pub use crate::state_manager::{SafetyManager, TelemetryBoard};
    pub use crate::structures::{
        ActuationPlan, FaultCause, HologramTarget, SafetyState, SafetyStatus, TelemetrySample,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version_constants() {
        assert!(!crate::config::VERSION.is_empty());
        assert_eq!(crate::hal::VERSION, crate::observability::VERSION);
    }
}
