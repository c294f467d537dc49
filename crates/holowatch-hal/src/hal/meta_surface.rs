// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use holowatch_structures::MetaSurfaceReading;
use ndarray::Array2;

use crate::hal::MetaSurfaceTelemetry;
use crate::HalResult;

/// Meta-surface command sink
pub trait MetaSurfaceInterface: Send {
    fn name(&self) -> &'static str;

    /// Element grid as (rows, cols)
    fn dimensions(&self) -> (usize, usize);

    /// Number of discrete drive levels per element
    fn drive_levels(&self) -> u32;

    /// Load per-element drive levels; elements settle asynchronously afterwards
    fn set_drive(&mut self, levels: &Array2<u16>, timeout_us: u64) -> HalResult<()>;

    /// True once every element has reached its commanded level
    fn is_settled(&self) -> bool;

    /// Latest temperature and settling status (non-blocking)
    fn read_telemetry(&self) -> HalResult<MetaSurfaceReading>;

    /// Shared read path for the safety watchdog
    fn telemetry_tap(&self) -> Arc<dyn MetaSurfaceTelemetry>;
}
