//! Delivery error taxonomy.
//!
//! Errors fall into a small set of categories with stable codes:
//! - 10-19: configuration errors
//! - 20-29: storage errors (cache read/write/delete)
//! - 30-39: transport errors (network, timeout)
//! - 40-49: serialization errors (payload could not be produced)
//! - 50-59: lifecycle errors (worker shut down, lock poisoned)
//!
//! Ledger capacity overflow is not an error: the oldest entry is evicted and
//! the eviction is logged at low severity.
//!
//! None of these is fatal to the host process. Background paths log and
//! recover; blocking variants surface them as an outcome.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Durable storage I/O.
    Storage,
    /// Network transport failures.
    Transport,
    /// Payload serialization.
    Serialization,
    /// Worker lifecycle and synchronization.
    Lifecycle,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Transport => write!(f, "transport"),
            ErrorCategory::Serialization => write!(f, "serialization"),
            ErrorCategory::Lifecycle => write!(f, "lifecycle"),
        }
    }
}

/// Unified error type for delivery operations.
#[derive(Error, Debug)]
pub enum DeliveryError {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    // Storage errors (20-29)
    #[error("storage error for key {key}: {message}")]
    Storage { key: String, message: String },

    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    // Transport errors (30-39)
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {millis}ms")]
    Timeout { millis: u64 },

    // Serialization errors (40-49)
    #[error("serialization error: {0}")]
    Serialization(String),

    // Lifecycle errors (50-59)
    #[error("worker {0} is shut down")]
    WorkerClosed(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl DeliveryError {
    /// Stable numeric code for this error.
    pub fn code(&self) -> u32 {
        match self {
            DeliveryError::Config(_) => 10,
            DeliveryError::Storage { .. } => 20,
            DeliveryError::InvalidKey(_) => 21,
            DeliveryError::Transport(_) => 30,
            DeliveryError::Timeout { .. } => 31,
            DeliveryError::Serialization(_) => 40,
            DeliveryError::WorkerClosed(_) => 50,
            DeliveryError::LockPoisoned(_) => 51,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DeliveryError::Config(_) => ErrorCategory::Config,
            DeliveryError::Storage { .. } | DeliveryError::InvalidKey(_) => ErrorCategory::Storage,
            DeliveryError::Transport(_) | DeliveryError::Timeout { .. } => {
                ErrorCategory::Transport
            }
            DeliveryError::Serialization(_) => ErrorCategory::Serialization,
            DeliveryError::WorkerClosed(_) | DeliveryError::LockPoisoned(_) => {
                ErrorCategory::Lifecycle
            }
        }
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DeliveryError::Storage { .. }
            | DeliveryError::Transport(_)
            | DeliveryError::Timeout { .. } => true,
            DeliveryError::Config(_)
            | DeliveryError::InvalidKey(_)
            | DeliveryError::Serialization(_)
            | DeliveryError::WorkerClosed(_)
            | DeliveryError::LockPoisoned(_) => false,
        }
    }

    pub fn storage(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        DeliveryError::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        DeliveryError::Serialization(err.to_string())
    }
}
