//! Error types for gating policy handling.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Error, Debug)]
pub enum GateError {
    /// I/O error reading or writing a policy file.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Policy JSON could not be parsed.
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("policy error: {0}")]
    PolicyError(String),
}
