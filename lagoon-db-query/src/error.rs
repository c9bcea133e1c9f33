//! Error types for query ingestion.
//!
//! Three families, matching how failures leave this subsystem:
//!
//! - [`EnvelopeError`] — the top-level query shape is wrong. Converted by the
//!   network layer into a client response; the attached backtrace is always
//!   empty.
//! - [`QueryError`] — a term inside the tree is malformed. Carries the
//!   backtrace id of the offending node.
//! - [`ArchiveError`] — binary codec failures. Returned as typed values and
//!   never unwound through parsing.

use crate::backtrace::BacktraceId;
use crate::term_type::ResponseType;
use std::io;
use thiserror::Error;

/// Result type for term parsing.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Result type for the binary term codecs.
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Classification of a term-level failure.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or any failure without a more specific class
    Generic,
    /// A referenced value does not exist
    NonExistence,
    /// An operation failed after effects may have been applied
    OpFailed,
    /// Internal invariant violation surfaced as an error in release builds
    Internal,
}

/// A term-level failure, pointing at the offending node.
#[derive(Error, Debug)]
#[error("{msg}")]
pub struct QueryError {
    /// Failure class
    pub kind: ErrorKind,
    /// Human-readable message
    pub msg: String,
    /// Backtrace id of the offending term
    pub bt: BacktraceId,
}

impl QueryError {
    /// Create an error of a specific kind
    pub fn new(kind: ErrorKind, msg: impl Into<String>, bt: BacktraceId) -> Self {
        Self {
            kind,
            msg: msg.into(),
            bt,
        }
    }

    /// Create a `Generic` error
    pub fn generic(msg: impl Into<String>, bt: BacktraceId) -> Self {
        Self::new(ErrorKind::Generic, msg, bt)
    }
}

/// An envelope-level failure; the backtrace is always empty.
#[derive(Error, Debug)]
#[error("{msg}")]
pub struct EnvelopeError {
    /// Response code sent to the client
    pub response: ResponseType,
    /// Human-readable message
    pub msg: String,
}

impl EnvelopeError {
    /// Create a `CLIENT_ERROR` envelope failure
    pub fn client_error(msg: impl Into<String>) -> Self {
        Self {
            response: ResponseType::ClientError,
            msg: msg.into(),
        }
    }
}

/// Binary codec failure.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Short read/write or any underlying stream failure
    #[error("stream error: {0}")]
    Io(#[from] io::Error),

    /// A declared length was negative or otherwise out of range
    #[error("length out of range: {0}")]
    Range(i64),

    /// A term type tag outside the closed enumeration
    #[error("unknown term type tag: {0}")]
    UnknownTermType(i32),

    /// A datum tag outside the datum encoding
    #[error("unknown datum tag: {0}")]
    UnknownDatumTag(u8),

    /// A length-prefixed string was not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// The embedded legacy record failed to parse
    #[error("malformed wire record: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::generic(
            "Query parse error: expected NUMBER but found STRING.",
            BacktraceId::EMPTY,
        );
        assert_eq!(
            err.to_string(),
            "Query parse error: expected NUMBER but found STRING."
        );
        assert_eq!(err.kind, ErrorKind::Generic);
    }

    #[test]
    fn test_envelope_error_is_client_error() {
        let err = EnvelopeError::client_error("Expected a query to be an array.");
        assert_eq!(err.response, ResponseType::ClientError);
    }
}
