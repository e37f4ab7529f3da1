// crates/perfgate-config/src/config.rs
// ============================================================================
// Module: Perfgate Configuration
// Description: Configuration loading and validation for perfgate runs.
// Purpose: Provide strict config parsing with hard size and path limits.
// Dependencies: perfgate-core, serde, toml, tracing
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file. The path comes from the caller,
//! then `PERFGATE_CONFIG`, then `perfgate.toml` in the working directory. A
//! missing implicit `perfgate.toml` yields the defaults; an explicitly named
//! file that cannot be read is an error.
//!
//! Thresholds live under `[limits.<collector identity>.<type tag>]` and are
//! handed to limits through [`SharedSettings`], so a run can swap them without
//! rebuilding its limits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use perfgate_core::LimitKind;
use perfgate_core::LimitsRegistry;
use perfgate_core::PerformanceLimits;
use perfgate_core::SharedSettings;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "perfgate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "PERFGATE_CONFIG";
/// Environment variable used to override the datafile path.
pub const DATAFILE_ENV_VAR: &str = "PERFGATE_DATAFILE";
/// Datafile written by a run when nothing else is configured.
pub const DEFAULT_DATAFILE_PATH: &str = "djpt.results_collected";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a collector identity or result name.
pub(crate) const MAX_NAME_LENGTH: usize = 256;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Perfgate run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerfgateConfig {
    /// Render the worst report when the run finishes.
    #[serde(default = "default_print_worst_report")]
    pub print_worst_report: bool,
    /// Datafile written by the run and read by `perfgate worst-report`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datafile_path: Option<PathBuf>,
    /// Limit references to register; the built-in limits when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_limits: Option<Vec<String>>,
    /// Thresholds keyed by collector identity, then limit type tag, then result name.
    #[serde(default)]
    pub limits: PerformanceLimits,
}

impl Default for PerfgateConfig {
    fn default() -> Self {
        Self {
            print_worst_report: default_print_worst_report(),
            datafile_path: None,
            known_limits: None,
            limits: PerformanceLimits::new(),
        }
    }
}

impl PerfgateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (resolved, explicit) = resolve_path(path)?;
        validate_path(&resolved)?;
        if !explicit && !resolved.exists() {
            debug!(path = %resolved.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let config = Self::from_toml_str(content)?;
        debug!(path = %resolved.display(), identities = config.limits.len(), "loaded config");
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.datafile_path {
            validate_path_string("datafile_path", &path.to_string_lossy())?;
        }
        for (identity, by_tag) in &self.limits {
            validate_name("limits collector identity", identity)?;
            for (tag, thresholds) in by_tag {
                if LimitKind::from_type_tag(tag).is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "limits.{identity}.{tag}: unknown limit type (expected queries or time)"
                    )));
                }
                for (name, threshold) in thresholds {
                    validate_name("limits result name", name)?;
                    if !threshold.is_finite() || *threshold < 0.0 {
                        return Err(ConfigError::Invalid(format!(
                            "limits.{identity}.{tag}.{name} must be finite and non-negative"
                        )));
                    }
                }
            }
        }
        self.limits_registry()?;
        Ok(())
    }

    /// Builds the limits registry from `known_limits`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unknown or ambiguous references.
    pub fn limits_registry(&self) -> Result<LimitsRegistry, ConfigError> {
        LimitsRegistry::settings_or_default(self.known_limits.as_deref())
            .map_err(|err| ConfigError::Invalid(format!("known_limits: {err}")))
    }

    /// Returns a live settings handle seeded with the configured thresholds.
    #[must_use]
    pub fn shared_settings(&self) -> SharedSettings {
        SharedSettings::new(self.limits.clone())
    }

    /// Resolves the datafile path.
    ///
    /// Precedence: `explicit`, then `PERFGATE_DATAFILE`, then `datafile_path`,
    /// then [`DEFAULT_DATAFILE_PATH`].
    #[must_use]
    pub fn resolve_datafile_path(&self, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = env::var_os(DATAFILE_ENV_VAR).filter(|value| !value.is_empty()) {
            return PathBuf::from(path);
        }
        self.datafile_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DATAFILE_PATH))
    }
}

/// Returns the default report printing flag.
const fn default_print_worst_report() -> bool {
    true
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
///
/// The flag is `false` only for the implicit default name.
fn resolve_path(path: Option<&Path>) -> Result<(PathBuf, bool), ConfigError> {
    if let Some(path) = path {
        return Ok((path.to_path_buf(), true));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok((PathBuf::from(env_path), true));
    }
    Ok((PathBuf::from(DEFAULT_CONFIG_NAME), false))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    if Path::new(value)
        .components()
        .any(|component| component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(ConfigError::Invalid(format!("{field} component too long")));
    }
    Ok(())
}

/// Validates an identity or result name.
fn validate_name(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length: {value}")));
    }
    Ok(())
}
