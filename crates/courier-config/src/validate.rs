//! Configuration validation errors and semantic validation.

use courier_common::EndpointKind;
use thiserror::Error;

use crate::delivery::DeliveryConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 10,
            ValidationError::ParseError(_) => 11,
            ValidationError::InvalidValue { .. } => 12,
            ValidationError::VersionMismatch { .. } => 13,
        }
    }
}

/// Validate a delivery configuration semantically.
pub fn validate_delivery_config(config: &DeliveryConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    for kind in EndpointKind::PRIORITY {
        if config.queue_limits.limit_for(kind) == 0 {
            return Err(ValidationError::InvalidValue {
                field: format!("queue_limits.{}", kind.path()),
                message: "Must be at least 1".to_string(),
            });
        }
    }

    if config.retry.initial_delay_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: "retry.initial_delay_secs".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if config.retry.max_delay_secs < config.retry.initial_delay_secs {
        return Err(ValidationError::InvalidValue {
            field: "retry.max_delay_secs".to_string(),
            message: format!(
                "Must be >= initial_delay_secs ({}), got {}",
                config.retry.initial_delay_secs, config.retry.max_delay_secs
            ),
        });
    }

    if config.timeouts.critical_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: "timeouts.critical_secs".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if config.timeouts.await_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: "timeouts.await_secs".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if config.snapshot_interval_ms == 0 {
        return Err(ValidationError::InvalidValue {
            field: "snapshot_interval_ms".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    let url = config.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::InvalidValue {
            field: "base_url".to_string(),
            message: format!("Must start with http:// or https://, got {:?}", url),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        validate_delivery_config(&DeliveryConfig::default()).unwrap();
    }

    #[test]
    fn test_zero_limit_names_kind() {
        let mut config = DeliveryConfig::default();
        config.queue_limits.network = 0;
        match validate_delivery_config(&config) {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "queue_limits.network")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_zero_snapshot_interval_rejected() {
        let config = DeliveryConfig {
            snapshot_interval_ms: 0,
            ..DeliveryConfig::default()
        };
        match validate_delivery_config(&config) {
            Err(ValidationError::InvalidValue { field, .. }) => {
                assert_eq!(field, "snapshot_interval_ms")
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ValidationError::IoError("x".into()).code(), 10);
        assert_eq!(ValidationError::ParseError("x".into()).code(), 11);
    }
}
