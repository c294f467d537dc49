// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use holowatch_structures::{LaserReading, MemsReading, MetaSurfaceReading};

use crate::HalResult;

/// Laser telemetry readable from any thread.
///
/// Must not block on the command path: the safety watchdog reads it while
/// the frame thread may be in the middle of a `set_intensity`.
pub trait LaserTelemetry: Send + Sync {
    fn read_laser(&self) -> HalResult<LaserReading>;
}

/// MEMS tracking telemetry readable from any thread
pub trait MirrorTelemetry: Send + Sync {
    fn read_mirror(&self) -> HalResult<MemsReading>;
}

/// Meta-surface telemetry readable from any thread
pub trait MetaSurfaceTelemetry: Send + Sync {
    fn read_meta_surface(&self) -> HalResult<MetaSurfaceReading>;
}

/// Independent read path to all three actuators
#[derive(Clone)]
pub struct DeviceTelemetry {
    pub laser: Arc<dyn LaserTelemetry>,
    pub mirror: Arc<dyn MirrorTelemetry>,
    pub meta_surface: Arc<dyn MetaSurfaceTelemetry>,
}

impl std::fmt::Debug for DeviceTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTelemetry").finish_non_exhaustive()
    }
}
