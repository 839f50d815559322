//! Error types for control-plane calls.

use thiserror::Error;

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned by a [`crate::ControlPlane`].
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[error("request to {endpoint} failed: {message}")]
    Http {
        /// Endpoint that was called.
        endpoint: String,
        /// Transport failure.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        /// Endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("could not decode response from {endpoint}: {message}")]
    Decode {
        /// Endpoint that was called.
        endpoint: String,
        /// Decoder message.
        message: String,
    },

    /// The server answered successfully with nothing useful.
    #[error("empty response from {endpoint}")]
    EmptyResponse {
        /// Endpoint that was called.
        endpoint: String,
    },

    /// The configured base URL cannot be used.
    #[error("invalid control-plane URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// Creates an `Http` error.
    #[must_use]
    pub fn http(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates a `Status` error.
    #[must_use]
    pub fn status(endpoint: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    /// Creates a `Decode` error.
    #[must_use]
    pub fn decode(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Creates an `EmptyResponse` error.
    #[must_use]
    pub fn empty(endpoint: impl Into<String>) -> Self {
        Self::EmptyResponse {
            endpoint: endpoint.into(),
        }
    }

    /// Returns `true` if the server rejected our credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    /// Returns `true` if the server said the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }

    /// Returns `true` if a later attempt could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
