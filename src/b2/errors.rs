//! B2 API Error Types
//!
//! Structured error handling for Backblaze B2 API operations.
//! Backend failures carry the HTTP status and the service's error payload;
//! an unknown bucket name is a separate domain error.

use serde::Deserialize;

/// B2 client error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum B2Error {
    #[error("B2 backend error ({status} {code}): {message}")]
    Backend {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error body returned by the B2 API on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl B2Error {
    /// Create a backend error from an HTTP status code and response body.
    ///
    /// B2 answers failures with `{"status", "code", "message"}`; anything else
    /// is kept verbatim as the message.
    pub fn from_status(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => B2Error::Backend {
                status,
                code: parsed.code,
                // Not a B2-shaped payload; keep what the server sent
                message: if parsed.message.is_empty() {
                    body.to_string()
                } else {
                    parsed.message
                },
            },
            Err(_) => B2Error::Backend {
                status,
                code: String::new(),
                message: body.to_string(),
            },
        }
    }

    /// Whether this is the bucket-name resolution miss
    pub fn is_not_found(&self) -> bool {
        matches!(self, B2Error::BucketNotFound(_))
    }

    /// Whether the service rejected the request
    pub fn is_backend(&self) -> bool {
        matches!(self, B2Error::Backend { .. })
    }

    /// HTTP status for backend errors
    pub fn status(&self) -> Option<u16> {
        match self {
            B2Error::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a caller could reasonably retry. The client itself never does.
    pub fn is_retryable(&self) -> bool {
        match self {
            B2Error::Network(_) => true,
            B2Error::Backend { status, .. } => matches!(status, 401 | 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for B2Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            B2Error::Decode(err.to_string())
        } else {
            B2Error::Network(err.to_string())
        }
    }
}
