// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Telemetry readings per source and the merged sample.
//!
//! All types are `Copy` so they can live in lock-free atomic cells.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaserReading {
    pub timestamp_us: u64,
    /// Aggregate optical power currently emitted
    pub draw_w: f64,
    /// Highest single-channel optical power
    pub max_channel_w: f64,
    pub junction_temp_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemsReading {
    pub timestamp_us: u64,
    /// Distance between commanded and measured angle
    pub position_error_deg: f64,
    pub x_deg: f64,
    pub y_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetaSurfaceReading {
    pub timestamp_us: u64,
    pub temperature_c: f64,
    pub settled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerReading {
    pub timestamp_us: u64,
    pub available_power_w: f64,
    pub thermal_headroom_c: f64,
}

/// Latest reading from every source merged into one value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub timestamp_us: u64,
    pub laser_power_w: f64,
    pub max_channel_power_w: f64,
    pub junction_temp_c: f64,
    pub mems_position_error_deg: f64,
    pub meta_surface_temp_c: f64,
    pub available_power_w: f64,
    pub thermal_headroom_c: f64,
    /// False when the power source had not reported; budget fields are then zero
    pub power_reported: bool,
}

impl TelemetrySample {
    /// Merge the latest per-source readings.
    ///
    /// A missing power reading is worst case: zero budget and zero headroom.
    pub fn from_readings(
        timestamp_us: u64,
        laser: Option<LaserReading>,
        mems: Option<MemsReading>,
        meta: Option<MetaSurfaceReading>,
        power: Option<PowerReading>,
    ) -> Self {
        Self {
            timestamp_us,
            laser_power_w: laser.map_or(0.0, |r| r.draw_w),
            max_channel_power_w: laser.map_or(0.0, |r| r.max_channel_w),
            junction_temp_c: laser.map_or(0.0, |r| r.junction_temp_c),
            mems_position_error_deg: mems.map_or(0.0, |r| r.position_error_deg),
            meta_surface_temp_c: meta.map_or(0.0, |r| r.temperature_c),
            available_power_w: power.map_or(0.0, |r| r.available_power_w),
            thermal_headroom_c: power.map_or(0.0, |r| r.thermal_headroom_c),
            power_reported: power.is_some(),
        }
    }

    /// Sample with nothing reported
    pub fn worst_case(timestamp_us: u64) -> Self {
        Self::from_readings(timestamp_us, None, None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_power_is_worst_case() {
        let sample = TelemetrySample::from_readings(
            10,
            Some(LaserReading {
                timestamp_us: 9,
                draw_w: 1.2,
                max_channel_w: 0.5,
                junction_temp_c: 31.0,
            }),
            None,
            None,
            None,
        );
        assert_eq!(sample.laser_power_w, 1.2);
        assert_eq!(sample.available_power_w, 0.0);
        assert_eq!(sample.thermal_headroom_c, 0.0);
        assert!(!sample.power_reported);
    }

    #[test]
    fn test_power_reading_carried_through() {
        let sample = TelemetrySample::from_readings(
            10,
            None,
            None,
            None,
            Some(PowerReading {
                timestamp_us: 8,
                available_power_w: 3.0,
                thermal_headroom_c: 12.0,
            }),
        );
        assert!(sample.power_reported);
        assert_eq!(sample.available_power_w, 3.0);
        assert_eq!(sample.thermal_headroom_c, 12.0);
    }
}
