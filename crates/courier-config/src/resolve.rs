//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths →
//! /etc → built-in defaults.

use std::path::{Path, PathBuf};

use crate::delivery::DeliveryConfig;
use crate::validate::validate_delivery_config;
use crate::ConfigError;

/// Where a configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/courier/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A discovered config file path and how it was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "COURIER_CONFIG";
pub const ENV_CONFIG_DIR: &str = "COURIER_CONFIG_DIR";
pub const ENV_STORAGE_DIR: &str = "COURIER_STORAGE_DIR";

const CONFIG_FILENAME: &str = "courier.json";

/// Application name for XDG directories.
const APP_NAME: &str = "courier";

/// Resolve the config file path.
///
/// 1. Explicit CLI path (if it exists)
/// 2. COURIER_CONFIG
/// 3. COURIER_CONFIG_DIR + courier.json
/// 4. XDG config directory (~/.config/courier/)
/// 5. System config (/etc/courier/)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli_path: Option<&Path>) -> ResolvedPath {
    if let Some(path) = cli_path {
        if path.exists() {
            return found(path.to_path_buf(), ConfigSource::CliArgument);
        }
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(CONFIG_FILENAME);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(CONFIG_FILENAME);
        if path.exists() {
            return found(path, ConfigSource::XdgConfig);
        }
    }

    let system_path = system_config_dir().join(CONFIG_FILENAME);
    if system_path.exists() {
        return found(system_path, ConfigSource::SystemConfig);
    }

    ResolvedPath::default()
}

fn found(path: PathBuf, source: ConfigSource) -> ResolvedPath {
    ResolvedPath {
        path: Some(path),
        source,
    }
}

/// Get the XDG config directory for courier.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

/// The effective configuration and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: DeliveryConfig,
    pub resolved: ResolvedPath,
    /// Storage directory after applying overrides.
    pub storage_dir: PathBuf,
}

/// Resolve, load, apply overrides and validate.
///
/// `storage_override` (typically a CLI flag) beats `COURIER_STORAGE_DIR`,
/// which beats the file value.
pub fn load_config(
    cli_path: Option<&Path>,
    storage_override: Option<&Path>,
) -> Result<LoadedConfig, ConfigError> {
    let resolved = resolve_config(cli_path);
    let mut config = match &resolved.path {
        Some(path) => DeliveryConfig::from_file(path)?,
        None => DeliveryConfig::default(),
    };

    if let Some(dir) = storage_override {
        config.storage_dir = Some(dir.to_path_buf());
    } else if let Ok(dir) = std::env::var(ENV_STORAGE_DIR) {
        if !dir.is_empty() {
            config.storage_dir = Some(PathBuf::from(dir));
        }
    }

    validate_delivery_config(&config)?;
    let storage_dir = config.storage_dir()?;

    Ok(LoadedConfig {
        config,
        resolved,
        storage_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(system_config_dir(), PathBuf::from("/etc/courier"));
    }

    #[test]
    fn test_xdg_config_dir() {
        if let Some(path) = xdg_config_dir() {
            assert!(path.ends_with(APP_NAME));
        }
    }
}
