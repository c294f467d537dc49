// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use holowatch_hal::HalError;
use holowatch_structures::{ControllerKind, FaultCause, StructureError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    /// The target cannot be rendered inside the hard safety bounds, even at
    /// minimum image quality (or at all, under the fail policy)
    #[error("Infeasible target for frame {frame_id}: {reason}")]
    InfeasibleTarget { frame_id: u64, reason: String },

    /// The target does not match the hardware (channel count, empty maps)
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Failed to build plan: {0}")]
    Structure(#[from] StructureError),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Laser command beyond the hard margin; output was forced to zero
    #[error("Unsafe laser command: {requested_w:.3} W requested, hard limit {limit_w:.3} W")]
    UnsafeCommand { requested_w: f64, limit_w: f64 },

    #[error("{controller} actuator error: {source}")]
    Actuator {
        controller: ControllerKind,
        #[source]
        source: HalError,
    },

    #[error("{controller} command timed out after {timeout_us} us")]
    Timeout {
        controller: ControllerKind,
        timeout_us: u64,
    },

    #[error("Invalid {controller} command: {reason}")]
    InvalidCommand {
        controller: ControllerKind,
        reason: String,
    },

    #[error("MEMS tracking error {error_deg:.3} deg above {tolerance_deg:.3} deg for {cycles} cycles")]
    TrackingFault {
        error_deg: f64,
        tolerance_deg: f64,
        cycles: u32,
    },

    /// Thermal protection: no new phase maps above the limit
    #[error("Meta-surface at {measured_c:.1} C exceeds {limit_c:.1} C")]
    OverTemperature { measured_c: f64, limit_c: f64 },

    #[error("{controller} configuration mismatch: {reason}")]
    Configuration {
        controller: ControllerKind,
        reason: String,
    },
}

impl ControllerError {
    pub(crate) fn from_hal(controller: ControllerKind, err: HalError) -> Self {
        match err {
            HalError::Timeout { timeout_us, .. } => ControllerError::Timeout {
                controller,
                timeout_us,
            },
            other => ControllerError::Actuator {
                controller,
                source: other,
            },
        }
    }

    /// Cause reported to the Safety Manager
    pub fn fault_cause(&self) -> FaultCause {
        match self {
            ControllerError::UnsafeCommand {
                requested_w,
                limit_w,
            } => FaultCause::UnsafeLaserCommand {
                requested_w: *requested_w,
                limit_w: *limit_w,
            },
            ControllerError::TrackingFault {
                error_deg,
                tolerance_deg,
                cycles,
            } => FaultCause::MemsTrackingFault {
                error_deg: *error_deg,
                tolerance_deg: *tolerance_deg,
                cycles: *cycles,
            },
            ControllerError::OverTemperature {
                measured_c,
                limit_c,
            } => FaultCause::MetaSurfaceOverTemperature {
                measured_c: *measured_c,
                limit_c: *limit_c,
            },
            ControllerError::Actuator { controller, .. }
            | ControllerError::Timeout { controller, .. }
            | ControllerError::InvalidCommand { controller, .. }
            | ControllerError::Configuration { controller, .. } => FaultCause::ActuatorFault {
                controller: *controller,
            },
        }
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;
