//! Storage errors.

use courier_common::DeliveryError;
use std::path::PathBuf;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid cache key {0:?}")]
    InvalidKey(String),

    #[error("I/O error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON for key {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<StoreError> for DeliveryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey(key) => DeliveryError::InvalidKey(key),
            StoreError::Io { key, source } => DeliveryError::storage(key, source),
            StoreError::Dir { path, source } => {
                DeliveryError::storage(path.display().to_string(), source)
            }
            StoreError::Json { key, source } => {
                DeliveryError::Serialization(format!("{}: {}", key, source))
            }
            StoreError::LockPoisoned(what) => DeliveryError::LockPoisoned(what),
        }
    }
}
