//! Endpoint classification for telemetry payloads.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a payload, determining its queue and retry priority.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// Session payloads (always retried first).
    Sessions,
    /// Discrete events, including crashes.
    Events,
    /// Binary blobs such as exit-info traces.
    Blobs,
    /// Log messages.
    Logging,
    /// Captured network-call events.
    Network,
}

impl EndpointKind {
    /// Every kind, in retrieval priority order. Sessions come first.
    pub const PRIORITY: [EndpointKind; 5] = [
        EndpointKind::Sessions,
        EndpointKind::Events,
        EndpointKind::Blobs,
        EndpointKind::Logging,
        EndpointKind::Network,
    ];

    /// URL path segment used by the backend for this kind.
    pub fn path(&self) -> &'static str {
        match self {
            EndpointKind::Sessions => "sessions",
            EndpointKind::Events => "events",
            EndpointKind::Blobs => "blobs",
            EndpointKind::Logging => "logging",
            EndpointKind::Network => "network",
        }
    }

    /// Parse a kind from its path segment.
    pub fn from_path(path: &str) -> Option<Self> {
        match path {
            "sessions" => Some(EndpointKind::Sessions),
            "events" => Some(EndpointKind::Events),
            "blobs" => Some(EndpointKind::Blobs),
            "logging" => Some(EndpointKind::Logging),
            "network" => Some(EndpointKind::Network),
            _ => None,
        }
    }

    /// Position in the retrieval priority order (0 is highest).
    pub fn priority(&self) -> usize {
        match self {
            EndpointKind::Sessions => 0,
            EndpointKind::Events => 1,
            EndpointKind::Blobs => 2,
            EndpointKind::Logging => 3,
            EndpointKind::Network => 4,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_starts_with_sessions() {
        assert_eq!(EndpointKind::PRIORITY[0], EndpointKind::Sessions);
        for (idx, kind) in EndpointKind::PRIORITY.iter().enumerate() {
            assert_eq!(kind.priority(), idx);
        }
    }

    #[test]
    fn test_path_roundtrip() {
        for kind in EndpointKind::PRIORITY {
            assert_eq!(EndpointKind::from_path(kind.path()), Some(kind));
        }
        assert_eq!(EndpointKind::from_path("spans"), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&EndpointKind::Logging).unwrap();
        assert_eq!(json, "\"logging\"");
        let kind: EndpointKind = serde_json::from_str("\"network\"").unwrap();
        assert_eq!(kind, EndpointKind::Network);
    }
}
