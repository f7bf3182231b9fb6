//! Crate-wide error type.

use crate::classify::{ApiError, ErrorCategory};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A request failed and was classified by the transport.
    #[error("{0}")]
    Api(ApiError),
    /// An auth endpoint rejected the exchange (login or refresh).
    #[error("Auth error during {operation}: {detail}")]
    Auth {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Maps this error into the user-facing taxonomy.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Api(e) => e.category,
            Self::Auth { status, .. } => match status {
                Some(401 | 403) => ErrorCategory::AuthInvalid,
                Some(code) => ErrorCategory::from_status(*code),
                None => ErrorCategory::NetworkError,
            },
            #[cfg(feature = "http")]
            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorCategory::NetworkError
                } else {
                    ErrorCategory::Unknown
                }
            }
            Self::Validation(_) => ErrorCategory::ValidationError,
            Self::Config(_) | Self::Storage(_) | Self::Decode(_) => ErrorCategory::Unknown,
        }
    }

    /// The classified API error, if this came out of the transport.
    #[must_use]
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for Error {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
