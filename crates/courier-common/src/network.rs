//! Last observed network reachability.
//!
//! The status is a single-writer, multi-reader value: exactly one
//! [`NetworkStatusWriter`] exists (owned by the connectivity observer) and any
//! number of [`NetworkStatusReader`] handles can be cloned from it. The writer
//! is not `Clone`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Network reachability as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NetworkStatus {
    Reachable,
    NotReachable,
    #[default]
    Unknown,
}

impl NetworkStatus {
    /// Whether a network attempt is worth making. Only a definite
    /// `NotReachable` short-circuits; `Unknown` is attempted.
    pub fn may_attempt(&self) -> bool {
        !matches!(self, NetworkStatus::NotReachable)
    }

    fn to_u8(self) -> u8 {
        match self {
            NetworkStatus::Reachable => 0,
            NetworkStatus::NotReachable => 1,
            NetworkStatus::Unknown => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => NetworkStatus::Reachable,
            1 => NetworkStatus::NotReachable,
            _ => NetworkStatus::Unknown,
        }
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkStatus::Reachable => write!(f, "reachable"),
            NetworkStatus::NotReachable => write!(f, "not_reachable"),
            NetworkStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Create the writer/reader pair for a fresh status cell.
pub fn network_status_channel(initial: NetworkStatus) -> (NetworkStatusWriter, NetworkStatusReader) {
    let cell = Arc::new(AtomicU8::new(initial.to_u8()));
    (
        NetworkStatusWriter {
            cell: Arc::clone(&cell),
        },
        NetworkStatusReader { cell },
    )
}

/// The single mutating handle.
#[derive(Debug)]
pub struct NetworkStatusWriter {
    cell: Arc<AtomicU8>,
}

impl NetworkStatusWriter {
    /// Publish a new status, returning the previous one.
    pub fn set(&self, status: NetworkStatus) -> NetworkStatus {
        NetworkStatus::from_u8(self.cell.swap(status.to_u8(), Ordering::AcqRel))
    }

    pub fn get(&self) -> NetworkStatus {
        NetworkStatus::from_u8(self.cell.load(Ordering::Acquire))
    }

    /// Another reader for the same cell.
    pub fn reader(&self) -> NetworkStatusReader {
        NetworkStatusReader {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Read-only handle.
#[derive(Debug, Clone)]
pub struct NetworkStatusReader {
    cell: Arc<AtomicU8>,
}

impl NetworkStatusReader {
    pub fn get(&self) -> NetworkStatus {
        NetworkStatus::from_u8(self.cell.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readers_observe_writer() {
        let (writer, reader) = network_status_channel(NetworkStatus::Unknown);
        let other = reader.clone();
        assert_eq!(reader.get(), NetworkStatus::Unknown);

        let prev = writer.set(NetworkStatus::NotReachable);
        assert_eq!(prev, NetworkStatus::Unknown);
        assert_eq!(reader.get(), NetworkStatus::NotReachable);
        assert_eq!(other.get(), NetworkStatus::NotReachable);
        assert_eq!(writer.reader().get(), NetworkStatus::NotReachable);
    }

    #[test]
    fn test_may_attempt() {
        assert!(NetworkStatus::Reachable.may_attempt());
        assert!(NetworkStatus::Unknown.may_attempt());
        assert!(!NetworkStatus::NotReachable.may_attempt());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&NetworkStatus::NotReachable).unwrap();
        assert_eq!(json, "\"NOT_REACHABLE\"");
    }
}
