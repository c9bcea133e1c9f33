//! Error types for lagoon-db-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// An array or object exceeded the configured element limit
    #[error("Array over size limit `{0}`.")]
    ArrayOverSizeLimit(usize),

    /// A JSON number that cannot be represented as a finite double
    #[error("Number not representable as a finite double: {0}")]
    BadNumber(String),

    /// JSON parsing error (serde_json)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a bad-number error
    pub fn bad_number(repr: impl Into<String>) -> Self {
        Error::BadNumber(repr.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}
