// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Safety state and fault causes.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Safety interlock state.
///
/// Stored in an atomic, hence the explicit `u8` discriminants.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafetyState {
    Idle = 0,
    Armed = 1,
    Projecting = 2,
    Fault = 3,
    Shutdown = 4,
}

impl SafetyState {
    pub const ALL: [SafetyState; 5] = [
        SafetyState::Idle,
        SafetyState::Armed,
        SafetyState::Projecting,
        SafetyState::Fault,
        SafetyState::Shutdown,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SafetyState::Idle),
            1 => Some(SafetyState::Armed),
            2 => Some(SafetyState::Projecting),
            3 => Some(SafetyState::Fault),
            4 => Some(SafetyState::Shutdown),
            _ => None,
        }
    }

    /// Plans may be dispatched to hardware only in these states
    pub fn permits_dispatch(self) -> bool {
        matches!(self, SafetyState::Armed | SafetyState::Projecting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SafetyState::Idle => "idle",
            SafetyState::Armed => "armed",
            SafetyState::Projecting => "projecting",
            SafetyState::Fault => "fault",
            SafetyState::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerKind {
    Laser,
    Mems,
    MetaSurface,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerKind::Laser => f.write_str("laser"),
            ControllerKind::Mems => f.write_str("mems"),
            ControllerKind::MetaSurface => f.write_str("meta-surface"),
        }
    }
}

/// Which constraint or controller put the interlock into Fault, or kept it out of Armed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultCause {
    LaserPowerExceeded { measured_w: f64, limit_w: f64 },
    ChannelPowerExceeded { measured_w: f64, limit_w: f64 },
    JunctionOverTemperature { measured_c: f64, limit_c: f64 },
    MetaSurfaceOverTemperature { measured_c: f64, limit_c: f64 },
    MemsPositionError { measured_deg: f64, limit_deg: f64 },
    MemsTrackingFault { error_deg: f64, tolerance_deg: f64, cycles: u32 },
    InsufficientPowerBudget { available_w: f64, required_w: f64 },
    NoThermalHeadroom { headroom_c: f64 },
    WatchdogTimeout { elapsed_us: u64, deadline_us: u64 },
    UnsafeLaserCommand { requested_w: f64, limit_w: f64 },
    SettleTimeout { controller: ControllerKind, waited_us: u64 },
    ActuatorFault { controller: ControllerKind },
    OperatorStop,
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCause::LaserPowerExceeded { measured_w, limit_w } => write!(
                f,
                "aggregate laser power {:.3} W exceeds {:.3} W",
                measured_w, limit_w
            ),
            FaultCause::ChannelPowerExceeded { measured_w, limit_w } => write!(
                f,
                "laser channel power {:.3} W exceeds {:.3} W",
                measured_w, limit_w
            ),
            FaultCause::JunctionOverTemperature { measured_c, limit_c } => write!(
                f,
                "laser junction temperature {:.1} C exceeds {:.1} C",
                measured_c, limit_c
            ),
            FaultCause::MetaSurfaceOverTemperature { measured_c, limit_c } => write!(
                f,
                "meta-surface temperature {:.1} C exceeds {:.1} C",
                measured_c, limit_c
            ),
            FaultCause::MemsPositionError {
                measured_deg,
                limit_deg,
            } => write!(
                f,
                "MEMS position error {:.3} deg exceeds {:.3} deg",
                measured_deg, limit_deg
            ),
            FaultCause::MemsTrackingFault {
                error_deg,
                tolerance_deg,
                cycles,
            } => write!(
                f,
                "MEMS tracking error {:.3} deg above tolerance {:.3} deg for {} cycles",
                error_deg, tolerance_deg, cycles
            ),
            FaultCause::InsufficientPowerBudget {
                available_w,
                required_w,
            } => write!(
                f,
                "available power budget {:.3} W below required {:.3} W",
                available_w, required_w
            ),
            FaultCause::NoThermalHeadroom { headroom_c } => {
                write!(f, "no thermal headroom ({:.1} C)", headroom_c)
            }
            FaultCause::WatchdogTimeout {
                elapsed_us,
                deadline_us,
            } => write!(
                f,
                "watchdog deadline missed: {} us since last heartbeat (deadline {} us)",
                elapsed_us, deadline_us
            ),
            FaultCause::UnsafeLaserCommand {
                requested_w,
                limit_w,
            } => write!(
                f,
                "unsafe laser command {:.3} W beyond hard margin of {:.3} W",
                requested_w, limit_w
            ),
            FaultCause::SettleTimeout {
                controller,
                waited_us,
            } => write!(f, "{} did not settle within {} us", controller, waited_us),
            FaultCause::ActuatorFault { controller } => {
                write!(f, "{} actuator fault", controller)
            }
            FaultCause::OperatorStop => f.write_str("operator stop"),
        }
    }
}

/// State plus the cause that produced it, replaced atomically as a unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyStatus {
    pub state: SafetyState,
    pub cause: Option<FaultCause>,
    pub since_us: u64,
}

impl SafetyStatus {
    pub const fn idle() -> Self {
        Self {
            state: SafetyState::Idle,
            cause: None,
            since_us: 0,
        }
    }
}

impl Default for SafetyStatus {
    fn default() -> Self {
        Self::idle()
    }
}
