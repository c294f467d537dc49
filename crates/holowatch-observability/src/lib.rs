// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # holowatch-observability
//!
//! Logging infrastructure shared by every Holowatch crate, with per-crate
//! debug flag support.
//!
//! ## Features
//! - `file-logging`: Timestamped run folders with per-crate rolling log files

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

// Re-export commonly used items
pub use cli::*;
pub use config::*;
pub use init::*;

/// Known Holowatch crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "holowatch",
    "holowatch-config",
    "holowatch-hal",
    "holowatch-state-manager",
    "holowatch-projector",
    "holowatch-frame-engine",
];

/// Tracing target for a crate name (`holowatch-frame-engine` -> `holowatch_frame_engine`)
pub fn crate_target(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}
