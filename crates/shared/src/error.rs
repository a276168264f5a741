use std::time::Duration;

use thiserror::Error;

/// Failure of a single outbound GET. Every transport problem ends up here so
/// callers can keep running on partial data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {endpoint} failed: {message}")]
    Network { endpoint: String, message: String },
    #[error("request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },
    #[error("{endpoint} responded with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("invalid response body from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("{endpoint} returned an invalid image url '{value}'")]
    InvalidImageUrl { endpoint: String, value: String },
}

impl FetchError {
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Network { endpoint, .. }
            | Self::Timeout { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Decode { endpoint, .. }
            | Self::InvalidImageUrl { endpoint, .. } => endpoint,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
