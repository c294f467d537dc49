// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use holowatch_structures::LaserReading;

use crate::hal::{KillSwitch, LaserTelemetry};
use crate::HalResult;

/// Laser source command sink
pub trait LaserInterface: Send {
    /// Driver name for logs
    fn name(&self) -> &'static str;

    /// Number of independently driven channels
    fn channel_count(&self) -> usize;

    /// Load a per-channel intensity vector, each entry in `[0, 1]`
    ///
    /// # Arguments
    /// * `intensity` - One value per channel
    /// * `start_at_us` - Time the modulation must begin (the mirror's scan epoch)
    /// * `timeout_us` - Bound on the bus transaction
    ///
    /// # Returns
    /// The time emission actually starts, or error. The call is atomic:
    /// on error the previous vector remains in effect.
    fn set_intensity(
        &mut self,
        intensity: &[f64],
        start_at_us: u64,
        timeout_us: u64,
    ) -> HalResult<u64>;

    /// Latest measured draw and junction temperature (non-blocking)
    fn read_telemetry(&self) -> HalResult<LaserReading>;

    /// Shared read path for the safety watchdog
    fn telemetry_tap(&self) -> Arc<dyn LaserTelemetry>;

    /// Emission inhibit line; engaging it must force optical output to zero
    fn kill_switch(&self) -> Arc<dyn KillSwitch>;
}
