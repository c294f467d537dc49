// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Latest telemetry reading per source.
//!
//! Each slot holds only the most recent reading and is replaced atomically;
//! there is no history buffer.

use crossbeam::atomic::AtomicCell;
use holowatch_structures::{
    LaserReading, MemsReading, MetaSurfaceReading, PowerReading, TelemetrySample,
};

#[derive(Debug, Default)]
pub struct TelemetryBoard {
    laser: AtomicCell<Option<LaserReading>>,
    mems: AtomicCell<Option<MemsReading>>,
    meta_surface: AtomicCell<Option<MetaSurfaceReading>>,
    power: AtomicCell<Option<PowerReading>>,
}

impl TelemetryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_laser(&self, reading: LaserReading) {
        self.laser.store(Some(reading));
    }

    pub fn publish_mems(&self, reading: MemsReading) {
        self.mems.store(Some(reading));
    }

    pub fn publish_meta_surface(&self, reading: MetaSurfaceReading) {
        self.meta_surface.store(Some(reading));
    }

    /// `None` records that the power source has gone silent
    pub fn publish_power(&self, reading: Option<PowerReading>) {
        self.power.store(reading);
    }

    pub fn latest_laser(&self) -> Option<LaserReading> {
        self.laser.load()
    }

    pub fn latest_mems(&self) -> Option<MemsReading> {
        self.mems.load()
    }

    pub fn latest_meta_surface(&self) -> Option<MetaSurfaceReading> {
        self.meta_surface.load()
    }

    pub fn latest_power(&self) -> Option<PowerReading> {
        self.power.load()
    }

    /// Merge the latest reading of every source; never waits
    pub fn snapshot(&self, now_us: u64) -> TelemetrySample {
        TelemetrySample::from_readings(
            now_us,
            self.latest_laser(),
            self.latest_mems(),
            self.latest_meta_surface(),
            self.latest_power(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_reading_wins() {
        let board = TelemetryBoard::new();
        for (ts, err) in [(1, 0.01), (2, 0.05)] {
            board.publish_mems(MemsReading {
                timestamp_us: ts,
                position_error_deg: err,
                x_deg: 0.0,
                y_deg: 0.0,
            });
        }
        let sample = board.snapshot(3);
        assert_eq!(sample.mems_position_error_deg, 0.05);
        assert_eq!(sample.timestamp_us, 3);
    }

    #[test]
    fn test_silent_power_source_is_worst_case() {
        let board = TelemetryBoard::new();
        board.publish_power(Some(PowerReading {
            timestamp_us: 1,
            available_power_w: 2.5,
            thermal_headroom_c: 8.0,
        }));
        assert!(board.snapshot(2).power_reported);

        board.publish_power(None);
        let sample = board.snapshot(3);
        assert!(!sample.power_reported);
        assert_eq!(sample.available_power_w, 0.0);
        assert_eq!(sample.thermal_headroom_c, 0.0);
    }
}
