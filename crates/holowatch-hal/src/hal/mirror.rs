// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use holowatch_structures::{MemsReading, MirrorTrajectory};

use crate::hal::MirrorTelemetry;
use crate::HalResult;

/// Time at which the mirror starts executing a loaded trajectory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEpoch {
    pub start_us: u64,
}

/// MEMS mirror command sink
pub trait MirrorInterface: Send {
    fn name(&self) -> &'static str;

    /// Load a trajectory
    ///
    /// # Returns
    /// The scan epoch the laser modulation must be co-timed against
    fn set_trajectory(
        &mut self,
        trajectory: &MirrorTrajectory,
        timeout_us: u64,
    ) -> HalResult<ScanEpoch>;

    /// Instantaneous measured angle (x, y) in degrees
    fn position(&self) -> (f64, f64);

    /// True once the mirror has locked onto the loaded trajectory
    fn is_settled(&self) -> bool;

    /// Latest commanded-vs-measured error (non-blocking)
    fn read_telemetry(&self) -> HalResult<MemsReading>;

    /// Shared read path for the safety watchdog
    fn telemetry_tap(&self) -> Arc<dyn MirrorTelemetry>;
}
