//! Telemetry envelopes and their routing metadata.
//!
//! An [`Envelope`] is an already-serialized payload plus the metadata needed
//! to route it: endpoint kind, a unique request id, and a destination. It is
//! immutable once built; clones share the payload bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::EndpointKind;

/// Unique identifier for a single delivery request.
///
/// Format: `req-<uuid v4 simple>`
/// Example: `req-6f1c2b0e9d7a4c3f8e2b1a0d9c8b7a6f`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        RequestId(format!("req-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Parse and validate an existing request ID string.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix("req-")?;
        if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(RequestId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HTTP method used for a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
    Get,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Get => write!(f, "GET"),
        }
    }
}

/// Where and how an envelope is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Absolute URL.
    pub url: String,

    /// HTTP method.
    #[serde(default)]
    pub method: HttpMethod,

    /// Content type of the payload.
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Content encoding applied to the payload, if any (e.g. `gzip`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl Destination {
    /// A JSON `POST` to `url`.
    pub fn post(url: impl Into<String>) -> Self {
        Destination {
            url: url.into(),
            method: HttpMethod::Post,
            content_type: default_content_type(),
            content_encoding: None,
        }
    }

    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A serialized telemetry payload plus routing metadata.
#[derive(Debug, Clone)]
pub struct Envelope {
    kind: EndpointKind,
    request_id: RequestId,
    destination: Destination,
    payload: Arc<[u8]>,
    created_at: DateTime<Utc>,
}

impl Envelope {
    /// Build an envelope with a freshly generated request id.
    pub fn new(kind: EndpointKind, destination: Destination, payload: impl Into<Vec<u8>>) -> Self {
        Self::with_request_id(kind, RequestId::new(), destination, payload)
    }

    /// Build an envelope that reuses an existing request id (e.g. when
    /// rebuilding a queued request).
    pub fn with_request_id(
        kind: EndpointKind,
        request_id: RequestId,
        destination: Destination,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Envelope {
            kind,
            request_id,
            destination,
            payload: Arc::from(payload.into()),
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = RequestId::new();
        assert!(id.as_str().starts_with("req-"));
        assert_eq!(id.as_str().len(), 36);
        assert_eq!(RequestId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn test_request_id_parse_rejects_garbage() {
        assert!(RequestId::parse("req-xyz").is_none());
        assert!(RequestId::parse("6f1c2b0e9d7a4c3f8e2b1a0d9c8b7a6f").is_none());
        assert!(RequestId::parse("req-6f1c2b0e9d7a4c3f8e2b1a0d9c8b7a6g").is_none());
    }

    #[test]
    fn test_envelope_clones_share_payload() {
        let env = Envelope::new(
            EndpointKind::Events,
            Destination::post("https://example.test/v1/log/events"),
            b"{\"a\":1}".to_vec(),
        );
        let copy = env.clone();
        assert_eq!(copy.request_id(), env.request_id());
        assert_eq!(copy.payload().as_ptr(), env.payload().as_ptr());
        assert_eq!(env.len(), 7);
    }

    #[test]
    fn test_destination_defaults_from_json() {
        let dest: Destination = serde_json::from_str(r#"{"url":"https://x.test"}"#).unwrap();
        assert_eq!(dest.method, HttpMethod::Post);
        assert_eq!(dest.content_type, "application/json");
        assert!(dest.content_encoding.is_none());
    }
}
