// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Holowatch State Manager
//!
//! Cross-task shared state for the display core and the safety interlock
//! that owns it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   SafetyCell                        │  ← Atomic state + status (single writer)
//! │   TelemetryBoard                    │  ← Latest reading per source, atomic replace
//! │   FrameCounters                     │  ← Relaxed atomics
//! └─────────────────────────────────────┘
//!           ↑ written only by
//! ┌─────────────────────────────────────┐
//! │   SafetyManager                     │  ← Transition table, fault path, watchdog
//! │   EventJournal                      │  ← Bounded history + subscribers
//! └─────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use holowatch_config::SafetyEnvelope;
//! use holowatch_state_manager::SafetyManager;
//! use holowatch_structures::{PowerReading, SafetyState, TelemetrySample};
//!
//! let manager = SafetyManager::new(SafetyEnvelope::default())?;
//! let sample = TelemetrySample::from_readings(
//!     0,
//!     None,
//!     None,
//!     None,
//!     Some(PowerReading { timestamp_us: 0, available_power_w: 3.0, thermal_headroom_c: 10.0 }),
//! );
//! manager.start(&sample, 0)?;
//! assert_eq!(manager.state(), SafetyState::Armed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod core_state;
pub mod events;
pub mod safety_manager;
pub mod telemetry_board;

pub use core_state::{FrameCounters, FrameCountersSnapshot, SafetyCell};
pub use events::{EventJournal, SafetyEvent, SafetyEventKind, SafetyQuantity};
pub use safety_manager::{next_state, SafetyManager, SafetyTrigger};
pub use telemetry_board::TelemetryBoard;

use holowatch_config::ConfigError;
use holowatch_structures::{FaultCause, SafetyState};

/// Safety interlock error types
#[derive(Debug, thiserror::Error)]
pub enum SafetyError {
    /// The envelope failed validation; nothing may be armed with it
    #[error("Invalid safety envelope: {0}")]
    InvalidEnvelope(#[from] ConfigError),

    /// Start was refused; the interlock stays Idle
    #[error("Start precheck failed: {0}")]
    PrecheckFailed(FaultCause),

    /// The requested transition is not in the table for the current state
    #[error("Invalid transition: {trigger} while {from}")]
    InvalidTransition {
        from: SafetyState,
        trigger: &'static str,
    },

    /// ResetFault before the fault was acknowledged
    #[error("Fault not acknowledged; reset refused")]
    NotAcknowledged,
}

pub type Result<T> = std::result::Result<T, SafetyError>;
