//! Outbound transport seam.
//!
//! The HTTP client itself lives outside this crate; it is reached through
//! [`Transport`], whose result is the tagged [`ApiResponse`].

use courier_common::Destination;
use thiserror::Error;

/// Failure below the HTTP layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

/// Result of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// 2xx response.
    Success { status: u16 },
    /// Non-2xx response.
    Failure { status: u16 },
    /// The request went out but nothing came back.
    NoResponse,
    /// The request could not be completed.
    Error(TransportError),
}

impl ApiResponse {
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            ApiResponse::Success { status }
        } else {
            ApiResponse::Failure { status }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    /// No HTTP response came back at all.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, ApiResponse::NoResponse | ApiResponse::Error(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiResponse::Success { status } | ApiResponse::Failure { status } => Some(*status),
            ApiResponse::NoResponse | ApiResponse::Error(_) => None,
        }
    }
}

impl std::fmt::Display for ApiResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiResponse::Success { status } => write!(f, "success ({})", status),
            ApiResponse::Failure { status } => write!(f, "failure ({})", status),
            ApiResponse::NoResponse => write!(f, "no response"),
            ApiResponse::Error(e) => write!(f, "transport error: {}", e),
        }
    }
}

/// Performs the actual network send.
pub trait Transport: Send + Sync {
    fn execute_send(&self, destination: &Destination, payload: &[u8]) -> ApiResponse;
}

impl<F> Transport for F
where
    F: Fn(&Destination, &[u8]) -> ApiResponse + Send + Sync,
{
    fn execute_send(&self, destination: &Destination, payload: &[u8]) -> ApiResponse {
        self(destination, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ApiResponse::from_status(204).is_success());
        for status in [199, 300, 404, 413, 503] {
            let response = ApiResponse::from_status(status);
            assert!(!response.is_success(), "{status}");
            assert!(!response.is_transport_failure(), "{status}");
            assert_eq!(response.status(), Some(status));
        }
        assert!(ApiResponse::NoResponse.is_transport_failure());
        assert!(ApiResponse::Error(TransportError::Timeout).is_transport_failure());
        assert_eq!(ApiResponse::NoResponse.status(), None);
    }

    #[test]
    fn test_closure_is_transport() {
        let transport = |_: &Destination, body: &[u8]| ApiResponse::from_status(200 + body.len() as u16);
        let response = transport.execute_send(&Destination::post("http://x.test"), b"abc");
        assert_eq!(response.status(), Some(203));
    }
}
