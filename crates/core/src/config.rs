//! TOML-based configuration for editmerge.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! that uses the builtin line merger.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Merge engine settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// External diff3 backend settings.
    #[serde(default)]
    pub diff3: Diff3Config,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Which implementation computes three-way merges.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergeBackendKind {
    /// In-process line merger.
    #[default]
    Builtin,
    /// External `diff3` executable.
    Diff3,
}

impl std::fmt::Display for MergeBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtin => write!(f, "builtin"),
            Self::Diff3 => write!(f, "diff3"),
        }
    }
}

impl std::str::FromStr for MergeBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "builtin" => Ok(Self::Builtin),
            "diff3" => Ok(Self::Diff3),
            other => Err(ConfigError::InvalidValue {
                field: "merge.backend".into(),
                detail: format!("unknown backend '{}', expected 'builtin' or 'diff3'", other),
            }),
        }
    }
}

/// Merge engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Backend used for three-way merges (default `builtin`).
    #[serde(default)]
    pub backend: MergeBackendKind,

    /// Label written after `<<<<<<<` in conflict blocks.
    #[serde(default = "default_mine_label")]
    pub mine_label: String,

    /// Label written after `>>>>>>>` in conflict blocks.
    #[serde(default = "default_yours_label")]
    pub yours_label: String,
}

fn default_mine_label() -> String {
    "mine".into()
}
fn default_yours_label() -> String {
    "yours".into()
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            backend: MergeBackendKind::default(),
            mine_label: default_mine_label(),
            yours_label: default_yours_label(),
        }
    }
}

// ---------------------------------------------------------------------------
// diff3
// ---------------------------------------------------------------------------

/// External diff3 configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diff3Config {
    /// Absolute path to the diff3 executable.
    #[serde(default = "default_diff3_path")]
    pub path: PathBuf,

    /// Seconds to wait for each diff3 invocation before giving up.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_diff3_path() -> PathBuf {
    PathBuf::from("/usr/bin/diff3")
}
fn default_timeout_secs() -> u64 {
    10
}

impl Default for Diff3Config {
    fn default() -> Self {
        Self {
            path: default_diff3_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!(backend = %config.merge.backend, "configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_label("merge.mine_label", &self.merge.mine_label)?;
        validate_label("merge.yours_label", &self.merge.yours_label)?;

        if self.diff3.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "diff3.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if self.merge.backend == MergeBackendKind::Diff3
            && self.diff3.path.as_os_str().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "diff3.path".into(),
                detail: "diff3 path must not be empty when backend is 'diff3'".into(),
            });
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".into(),
                    detail: format!("unknown level '{}'", other),
                })
            }
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

fn validate_label(field: &str, label: &str) -> Result<(), ConfigError> {
    if label.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: "label must not be empty".into(),
        });
    }
    if label.contains('\n') || label.contains('\r') {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: "label must be a single line".into(),
        });
    }
    Ok(())
}
