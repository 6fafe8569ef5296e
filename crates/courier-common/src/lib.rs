//! Courier common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the courier crates:
//! - Endpoint kinds and their fixed retrieval priority
//! - Request identifiers, destinations, and telemetry envelopes
//! - The process-wide network status cell (single writer, many readers)
//! - The delivery error taxonomy
//! - Output formats for the inspection CLI

pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod network;
pub mod output;

pub use endpoint::EndpointKind;
pub use envelope::{Destination, Envelope, HttpMethod, RequestId};
pub use error::{DeliveryError, ErrorCategory, Result};
pub use network::{network_status_channel, NetworkStatus, NetworkStatusReader, NetworkStatusWriter};
pub use output::OutputFormat;

/// Schema version for persisted courier state.
pub const SCHEMA_VERSION: &str = "1.0.0";
