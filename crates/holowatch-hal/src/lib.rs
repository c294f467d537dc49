// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # holowatch-hal
//!
//! Platform-agnostic actuator interfaces for the holographic display core:
//! laser source, MEMS mirror, meta-surface, power telemetry, time and
//! emission kill switches.
//!
//! Bus-level drivers (I2C/SPI/GPIO) live outside this crate; each platform
//! wraps them behind these traits. The `simulated` feature provides software
//! models with fault injection for tests and the simulator tool.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod error;
pub mod hal;
pub mod platforms;

pub use error::{HalError, HalResult};
pub use hal::*;
pub use platforms::MonotonicClock;

#[cfg(feature = "simulated")]
pub use platforms::simulated;
