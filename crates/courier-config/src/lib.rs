//! Courier configuration loading and validation.
//!
//! This crate provides:
//! - Typed `DeliveryConfig` (queue limits, retry backoff, timeouts, paths)
//! - Config resolution (CLI → env → XDG → /etc → defaults)
//! - Semantic validation

pub mod delivery;
pub mod resolve;
pub mod validate;

pub use delivery::{DeliveryConfig, QueueLimits, RetryConfig, TimeoutConfig};
pub use resolve::{load_config, resolve_config, ConfigSource, LoadedConfig, ResolvedPath};
pub use validate::{validate_delivery_config, ValidationError, ValidationResult};

use thiserror::Error;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Errors from loading an effective configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("no storage directory: set storage_dir or COURIER_STORAGE_DIR")]
    NoStorageDir,
}

impl From<ConfigError> for courier_common::DeliveryError {
    fn from(err: ConfigError) -> Self {
        courier_common::DeliveryError::Config(err.to_string())
    }
}
