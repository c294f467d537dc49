// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Actuator interface errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    /// The operation did not complete within its bounded latency
    #[error("{operation} timed out after {timeout_us} us")]
    Timeout {
        operation: &'static str,
        timeout_us: u64,
    },

    /// The device's kill switch is engaged
    #[error("Output inhibited by kill switch")]
    Inhibited,

    /// The device rejected the command (shape, range)
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// The device reported a hardware fault
    #[error("Device fault: {0}")]
    DeviceFault(String),
}

pub type HalResult<T> = Result<T, HalError>;
