// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-holowatch-projector`, `--debug-holowatch-frame-engine`, etc.

use std::collections::HashMap;
use std::env;

use crate::{crate_target, KNOWN_CRATES};

/// Parse debug flags from command-line arguments
///
/// # Example
/// ```rust
/// use holowatch_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(std::env::args());
/// if flags.is_enabled("holowatch-projector") {
///     // Enable debug logging for the optimizer and controllers
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrateDebugFlags {
    pub enabled_crates: HashMap<String, bool>,
}

impl CrateDebugFlags {
    /// Parse debug flags from command-line arguments
    ///
    /// Looks for arguments matching `--debug-{crate-name}` pattern.
    /// Also supports `--debug-all` to enable all crates.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut enabled_crates = HashMap::new();
        let mut debug_all = false;

        for arg in args {
            if arg == "--debug-all" {
                debug_all = true;
                continue;
            }

            if let Some(crate_name) = arg.strip_prefix("--debug-") {
                enabled_crates.insert(crate_name.to_string(), true);
            }
        }

        if debug_all {
            for crate_name in KNOWN_CRATES {
                enabled_crates.insert(crate_name.to_string(), true);
            }
        }

        CrateDebugFlags { enabled_crates }
    }

    /// Check if debug is enabled for a specific crate
    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains_key(crate_name)
    }

    /// Get all enabled crates
    pub fn enabled_crates(&self) -> Vec<&String> {
        self.enabled_crates.keys().collect()
    }

    /// Check if debug is enabled for any crate
    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// Get log level filter for a crate
    ///
    /// Returns `tracing::Level::DEBUG` if enabled, `tracing::Level::INFO` otherwise.
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Create a tracing filter from debug flags
    ///
    /// Format: "holowatch_projector=debug,info" or `base_level` if none enabled.
    pub fn to_filter_string_with_base(&self, base_level: &str) -> String {
        if self.enabled_crates.is_empty() {
            return base_level.to_string();
        }

        let mut names: Vec<&String> = self.enabled_crates.keys().collect();
        names.sort();
        let mut filters: Vec<String> = names
            .into_iter()
            .map(|name| format!("{}=debug", crate_target(name)))
            .collect();
        filters.push(base_level.to_string());
        filters.join(",")
    }

    /// Same as [`Self::to_filter_string_with_base`] with an `info` base level
    pub fn to_filter_string(&self) -> String {
        self.to_filter_string_with_base("info")
    }
}

/// Helper function to parse debug flags from environment
///
/// Checks both command-line arguments and the `HOLOWATCH_DEBUG` environment variable.
/// Environment variable format: comma-separated crate names, e.g.
/// "holowatch-projector,holowatch-frame-engine". Boolean values ("true", "1")
/// are treated as `all`.
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(env_var) = env::var("HOLOWATCH_DEBUG") {
        merge_env_spec(&mut flags, &env_var);
    }
    flags
}

fn merge_env_spec(flags: &mut CrateDebugFlags, spec: &str) {
    let lower = spec.trim().to_lowercase();
    if lower == "all" || lower == "true" || lower == "1" {
        for crate_name in KNOWN_CRATES {
            flags.enabled_crates.insert(crate_name.to_string(), true);
        }
        return;
    }
    if lower == "false" || lower == "0" {
        return;
    }
    for crate_name in spec.split(',') {
        let crate_name = crate_name.trim();
        if !crate_name.is_empty() {
            flags.enabled_crates.insert(crate_name.to_string(), true);
        }
    }
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  HOLOWATCH_DEBUG={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  HOLOWATCH_DEBUG=all                               Enable debug for all crates

Examples:
  --debug-holowatch-projector
  --debug-holowatch-projector --debug-holowatch-frame-engine
  HOLOWATCH_DEBUG=holowatch-state-manager
"#,
        KNOWN_CRATES.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-holowatch-projector".to_string()]);
        assert!(flags.is_enabled("holowatch-projector"));
        assert!(!flags.is_enabled("holowatch-frame-engine"));
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_filter_string_uses_module_targets() {
        let flags = CrateDebugFlags::from_args(vec![
            "--debug-holowatch-state-manager".to_string(),
            "--debug-holowatch-hal".to_string(),
        ]);
        assert_eq!(
            flags.to_filter_string_with_base("warn"),
            "holowatch_hal=debug,holowatch_state_manager=debug,warn"
        );
    }

    #[test]
    fn test_empty_flags_fall_back_to_base_level() {
        let flags = CrateDebugFlags::default();
        assert_eq!(flags.to_filter_string(), "info");
        assert!(!flags.any_enabled());
    }

    #[test]
    fn test_env_spec_parsing() {
        let mut flags = CrateDebugFlags::default();
        merge_env_spec(&mut flags, "holowatch-hal, holowatch-projector");
        assert!(flags.is_enabled("holowatch-hal"));
        assert!(flags.is_enabled("holowatch-projector"));

        let mut flags = CrateDebugFlags::default();
        merge_env_spec(&mut flags, "true");
        assert_eq!(flags.enabled_crates().len(), KNOWN_CRATES.len());

        let mut flags = CrateDebugFlags::default();
        merge_env_spec(&mut flags, "0");
        assert!(!flags.any_enabled());
    }

    #[test]
    fn test_log_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-holowatch-projector".to_string()]);
        assert_eq!(flags.log_level("holowatch-projector"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("holowatch-hal"), tracing::Level::INFO);
    }
}
