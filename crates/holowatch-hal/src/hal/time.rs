// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Monotonic time source
pub trait TimeProvider: Send + Sync {
    /// Microseconds since an arbitrary, fixed origin
    fn get_time_us(&self) -> u64;

    /// Wait for `us` microseconds
    ///
    /// Simulated clocks advance instead of sleeping.
    fn delay_us(&self, us: u64);

    fn get_time_ms(&self) -> u64 {
        self.get_time_us() / 1000
    }
}
