// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

mod std_clock;

/// Software actuator models with fault-injection handles.
#[cfg(feature = "simulated")]
pub mod simulated;

pub use std_clock::MonotonicClock;
