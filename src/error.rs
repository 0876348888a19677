//! Request-level failures of the exposed interface.
//!
//! Network faults never show up here: they are folded into the
//! verification results themselves.

use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("missing email")]
    MissingEmail,

    #[error("email format is invalid")]
    InvalidFormat,

    #[error("No MX records found for domain")]
    NoMxRecords,

    #[error("Failed to connect to SMTP server")]
    ConnectionFailed,

    #[error("emails must be an array")]
    NotAList,

    #[error("maximum {max} emails allowed per request")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// HTTP status an HTTP layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingEmail
            | Self::InvalidFormat
            | Self::NoMxRecords
            | Self::NotAList
            | Self::BatchTooLarge { .. } => 400,
            Self::ConnectionFailed | Self::Internal => 500,
        }
    }

    pub fn body(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch of {len} addresses exceeds the limit of {max}")]
    TooLarge { len: usize, max: usize },
}

impl From<BatchError> for ApiError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::TooLarge { len, max } => Self::BatchTooLarge { len, max },
        }
    }
}
