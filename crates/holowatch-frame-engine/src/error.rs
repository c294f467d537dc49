// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use holowatch_projector::ControllerError;
use holowatch_structures::{ControllerKind, FaultCause, SafetyState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// Prolonged non-settle; the frame was blanked
    #[error("{controller} did not settle within {waited_us} us")]
    SettleTimeout {
        controller: ControllerKind,
        waited_us: u64,
    },

    /// Safety state left {Armed, Projecting} while the frame was in flight
    #[error("Dispatch aborted: safety state is {0}")]
    Aborted(SafetyState),
}

impl DispatchError {
    /// Cause to report to the Safety Manager, if this is a fault
    pub fn fault_cause(&self) -> Option<FaultCause> {
        match self {
            DispatchError::Controller(err) => Some(err.fault_cause()),
            DispatchError::SettleTimeout {
                controller,
                waited_us,
            } => Some(FaultCause::SettleTimeout {
                controller: *controller,
                waited_us: *waited_us,
            }),
            DispatchError::Aborted(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameEngineError {
    #[error("{0} already running")]
    AlreadyRunning(&'static str),

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Controller setup failed: {0}")]
    Controller(#[from] ControllerError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] holowatch_config::ConfigError),

    #[error(transparent)]
    Safety(#[from] holowatch_state_manager::SafetyError),
}

pub type Result<T> = std::result::Result<T, FrameEngineError>;
