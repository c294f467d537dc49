// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use holowatch_structures::PowerReading;

/// Power budget telemetry from the energy subsystem
pub trait PowerTelemetrySource: Send + Sync {
    /// Most recent reading, or `None` if the source has not reported.
    ///
    /// Never waits for a future sample.
    fn latest(&self) -> Option<PowerReading>;
}
