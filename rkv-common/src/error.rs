//! # Error Taxonomy
//!
//! Purpose: One error type shared by the pool, the connection, and the reply
//! converters so callers can match on the failure kind they care about.
//!
//! ## Design Principles
//! 1. **Distinct Null**: `Nil` is its own variant and never doubles as a
//!    type error, so "no result" stays separable from "wrong result".
//! 2. **No Internal Retry**: Every variant is surfaced to the immediate caller.
//! 3. **Sticky Taint**: Transport failures are reported once as `Io` and
//!    afterwards as `Tainted` without touching the socket again.

use std::io;

use thiserror::Error;

/// Result type used across the workspace.
pub type RkvResult<T> = Result<T, RkvError>;

/// Errors surfaced by the client access layer.
#[derive(Debug, Error)]
pub enum RkvError {
    /// The store replied with its null value.
    #[error("nil reply")]
    Nil,

    /// No connection became available within the wait budget.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// `get` was called on a pool that has been closed.
    #[error("get on closed pool")]
    PoolClosed,

    /// The dial factory failed to establish a new connection.
    #[error("dial failed: {0}")]
    Dial(#[source] io::Error),

    /// The reply shape does not match the requested conversion.
    #[error("unexpected reply type: expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Reply text could not be parsed as the requested number.
    #[error("cannot parse {text:?} as {expected}")]
    Parse { expected: &'static str, text: String },

    /// A negative integer was converted to an unsigned type.
    #[error("unexpected negative value: {0}")]
    NegativeInt(i64),

    /// The store answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// Network failure while reading or writing.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// RESP2 framing violation.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection hit a fatal error earlier and refuses further commands.
    #[error("connection unusable after earlier failure: {0}")]
    Tainted(String),

    /// The connection was closed by its owner.
    #[error("connection closed")]
    Closed,
}

impl RkvError {
    /// Returns true when the error is the null-reply marker.
    pub fn is_nil(&self) -> bool {
        matches!(self, RkvError::Nil)
    }

    /// Returns true for failures the reply converters raise on shape errors.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, RkvError::TypeMismatch { .. } | RkvError::Parse { .. })
    }

    /// Returns true when the failure leaves a connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RkvError::Io(_) | RkvError::Protocol(_) | RkvError::Tainted(_) | RkvError::Closed
        )
    }
}
