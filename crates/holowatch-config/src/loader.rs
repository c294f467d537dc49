// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)
//!
//! The `[safety]` section is deliberately absent from both override tiers:
//! envelope limits come from the file only.

use crate::{ConfigError, ConfigResult, HolowatchConfig};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_FILE_NAME: &str = "holowatch_configuration.toml";

/// Find the Holowatch configuration file
///
/// Search order:
/// 1. `HOLOWATCH_CONFIG_PATH` environment variable
/// 2. Current working directory: `./holowatch_configuration.toml`
/// 3. Parent directory: `../holowatch_configuration.toml`
/// 4. Workspace root (searches up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("HOLOWATCH_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by HOLOWATCH_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "Holowatch configuration file '{}' not found in any of these locations:\n{}\n\nSet HOLOWATCH_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found, contains invalid TOML or an
/// override value does not parse.
/// Call [`crate::validate_config`] on the result before arming any hardware.
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<HolowatchConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: HolowatchConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower == "true" || lower == "1" || lower == "yes"
}

/// Parse one override value, naming its source in the error
fn parse_override<T>(source: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(format!("{} = {:?}: {}", source, value, e)))
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `HOLOWATCH_LOG_LEVEL` -> `system.log_level`
/// - `HOLOWATCH_DEBUG` -> `system.debug`
/// - `HOLOWATCH_FRAME_RATE_HZ` -> `frame.frame_rate_hz`
/// - `HOLOWATCH_INFEASIBLE_FRAME_POLICY` -> `frame.infeasible_frame_policy`
/// - `HOLOWATCH_INFEASIBILITY_POLICY` -> `optimizer.infeasibility_policy`
/// - `HOLOWATCH_OPTIMIZER_MAX_ITERATIONS` -> `optimizer.max_iterations`
/// - `HOLOWATCH_LOG_DIR` -> `logging.log_dir`
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for a value that does not parse;
/// the configuration may already hold earlier overrides and must be discarded.
pub fn apply_environment_overrides(config: &mut HolowatchConfig) -> ConfigResult<()> {
    if let Ok(value) = env::var("HOLOWATCH_LOG_LEVEL") {
        config.system.log_level = value;
    }
    if let Ok(value) = env::var("HOLOWATCH_DEBUG") {
        // HOLOWATCH_DEBUG also carries per-crate debug specs for observability;
        // only a plain boolean flips the system flag.
        if parse_bool(&value) {
            config.system.debug = true;
        }
    }

    if let Ok(value) = env::var("HOLOWATCH_FRAME_RATE_HZ") {
        config.frame.frame_rate_hz = parse_override("HOLOWATCH_FRAME_RATE_HZ", &value)?;
    }
    if let Ok(value) = env::var("HOLOWATCH_INFEASIBLE_FRAME_POLICY") {
        config.frame.infeasible_frame_policy =
            parse_override("HOLOWATCH_INFEASIBLE_FRAME_POLICY", &value)?;
    }

    if let Ok(value) = env::var("HOLOWATCH_INFEASIBILITY_POLICY") {
        config.optimizer.infeasibility_policy =
            parse_override("HOLOWATCH_INFEASIBILITY_POLICY", &value)?;
    }
    if let Ok(value) = env::var("HOLOWATCH_OPTIMIZER_MAX_ITERATIONS") {
        config.optimizer.max_iterations =
            parse_override("HOLOWATCH_OPTIMIZER_MAX_ITERATIONS", &value)?;
    }

    if let Ok(value) = env::var("HOLOWATCH_LOG_DIR") {
        config.logging.log_dir = PathBuf::from(value);
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"frame_rate_hz": "90", "log_level": "debug"}`)
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for a value that does not parse.
pub fn apply_cli_overrides(
    config: &mut HolowatchConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    if let Some(value) = cli_args.get("debug") {
        config.system.debug = parse_bool(value);
    }
    if let Some(value) = cli_args.get("log_level") {
        config.system.log_level = value.clone();
    }

    if let Some(value) = cli_args.get("frame_rate_hz") {
        config.frame.frame_rate_hz = parse_override("--frame_rate_hz", value)?;
    }
    if let Some(value) = cli_args.get("optimizer_budget_fraction") {
        config.frame.optimizer_budget_fraction =
            parse_override("--optimizer_budget_fraction", value)?;
    }
    if let Some(value) = cli_args.get("infeasible_frame_policy") {
        config.frame.infeasible_frame_policy = parse_override("--infeasible_frame_policy", value)?;
    }

    if let Some(value) = cli_args.get("infeasibility_policy") {
        config.optimizer.infeasibility_policy = parse_override("--infeasibility_policy", value)?;
    }
    if let Some(value) = cli_args.get("max_iterations") {
        config.optimizer.max_iterations = parse_override("--max_iterations", value)?;
    }

    if let Some(value) = cli_args.get("log_dir") {
        config.logging.log_dir = PathBuf::from(value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InfeasibilityPolicy, InfeasibleFramePolicy};
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("HOLOWATCH_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("HOLOWATCH_CONFIG_PATH");

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("does_not_exist.toml");

        env::set_var("HOLOWATCH_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("HOLOWATCH_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved_rate = env::var("HOLOWATCH_FRAME_RATE_HZ").ok();
        env::remove_var("HOLOWATCH_FRAME_RATE_HZ");
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[frame]").unwrap();
        writeln!(file, "frame_rate_hz = 90.0").unwrap();
        writeln!(file, "[safety]").unwrap();
        writeln!(file, "max_aggregate_laser_power_w = 1.5").unwrap();
        writeln!(file, "[laser]").unwrap();
        writeln!(file, "channel_full_scale_w = [0.5, 0.5]").unwrap();
        writeln!(file, "wavelengths_nm = [638.0, 520.0]").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.frame.frame_rate_hz, 90.0);
        assert_eq!(config.safety.max_aggregate_laser_power_w, 1.5);
        assert_eq!(config.laser.channel_count(), 2);
        // Unspecified fields fall back to defaults
        assert_eq!(config.safety.max_channel_power_w, 0.8);

        if let Some(value) = saved_rate {
            env::set_var("HOLOWATCH_FRAME_RATE_HZ", value);
        }
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[frame").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = HolowatchConfig::default();

        env::set_var("HOLOWATCH_FRAME_RATE_HZ", "120");
        env::set_var("HOLOWATCH_INFEASIBILITY_POLICY", "fail");
        env::set_var("HOLOWATCH_INFEASIBLE_FRAME_POLICY", "blank");

        apply_environment_overrides(&mut config).unwrap();

        env::remove_var("HOLOWATCH_FRAME_RATE_HZ");
        env::remove_var("HOLOWATCH_INFEASIBILITY_POLICY");
        env::remove_var("HOLOWATCH_INFEASIBLE_FRAME_POLICY");

        assert_eq!(config.frame.frame_rate_hz, 120.0);
        assert_eq!(
            config.optimizer.infeasibility_policy,
            InfeasibilityPolicy::Fail
        );
        assert_eq!(
            config.frame.infeasible_frame_policy,
            InfeasibleFramePolicy::Blank
        );
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = HolowatchConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("frame_rate_hz".to_string(), "30".to_string());
        cli_args.insert("log_level".to_string(), "debug".to_string());
        cli_args.insert("infeasibility_policy".to_string(), "fail".to_string());

        apply_cli_overrides(&mut config, &cli_args).unwrap();

        assert_eq!(config.frame.frame_rate_hz, 30.0);
        assert_eq!(config.system.log_level, "debug");
        assert_eq!(
            config.optimizer.infeasibility_policy,
            InfeasibilityPolicy::Fail
        );
    }

    #[test]
    fn test_unparseable_cli_override_is_error() {
        let mut config = HolowatchConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("infeasibility_policy".to_string(), "nonsense".to_string());

        let err = apply_cli_overrides(&mut config, &cli_args).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref msg) if msg.contains("nonsense")));

        cli_args.clear();
        cli_args.insert("max_iterations".to_string(), "-3".to_string());
        assert!(matches!(
            apply_cli_overrides(&mut config, &cli_args),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_unparseable_environment_override_fails_load() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        File::create(&config_path).unwrap();

        env::set_var("HOLOWATCH_INFEASIBLE_FRAME_POLICY", "sometimes");
        let result = load_config(Some(&config_path), None);
        env::remove_var("HOLOWATCH_INFEASIBLE_FRAME_POLICY");

        match result {
            Err(ConfigError::InvalidValue(msg)) => {
                assert!(msg.contains("HOLOWATCH_INFEASIBLE_FRAME_POLICY"))
            }
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_overrides_never_touch_safety_envelope() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[safety]").unwrap();
        writeln!(file, "max_aggregate_laser_power_w = 1.25").unwrap();

        env::set_var("HOLOWATCH_MAX_AGGREGATE_LASER_POWER_W", "10.0");
        let mut cli_args = HashMap::new();
        cli_args.insert("max_aggregate_laser_power_w".to_string(), "10.0".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();
        env::remove_var("HOLOWATCH_MAX_AGGREGATE_LASER_POWER_W");

        assert_eq!(config.safety.max_aggregate_laser_power_w, 1.25);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        // CLI overrides take precedence over environment variables
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[system]").unwrap();
        writeln!(file, "log_level = \"warn\"").unwrap();
        writeln!(file, "[frame]").unwrap();
        writeln!(file, "frame_rate_hz = 60.0").unwrap();

        env::set_var("HOLOWATCH_LOG_LEVEL", "debug");
        env::set_var("HOLOWATCH_FRAME_RATE_HZ", "72");

        let mut cli_args = HashMap::new();
        cli_args.insert("log_level".to_string(), "trace".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("HOLOWATCH_LOG_LEVEL");
        env::remove_var("HOLOWATCH_FRAME_RATE_HZ");

        // CLI wins for log level, env wins for frame rate (no CLI override)
        assert_eq!(config.system.log_level, "trace");
        assert_eq!(config.frame.frame_rate_hz, 72.0);
    }
}
