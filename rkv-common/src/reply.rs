//! # Reply Values
//!
//! Purpose: Represent one decoded protocol response as a closed tagged
//! variant so every consumer matches exhaustively instead of probing types.
//!
//! ## Design Principles
//! 1. **Closed Set**: Nil, integer, byte string, status text, error, array.
//! 2. **Binary-Safe**: Bulk strings stay raw bytes until a converter asks
//!    for text.
//! 3. **Transient**: A reply is produced by the decoder and consumed
//!    immediately by a converter; nothing caches it.

use std::fmt;

/// Untyped value decoded from a single response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Null bulk string or null array.
    Nil,
    /// `:123` integer reply.
    Integer(i64),
    /// `$n` bulk string.
    Bytes(Vec<u8>),
    /// `+OK` style status text, already decoded.
    Status(String),
    /// `-ERR ...` error reply.
    Error(String),
    /// `*n` array of nested replies.
    Array(Vec<Reply>),
}

impl Reply {
    /// Returns true for the null marker.
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Short name of the variant, used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Integer(_) => "integer",
            Reply::Bytes(_) => "bytes",
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Array(_) => "array",
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Nil => write!(f, "(nil)"),
            Reply::Integer(value) => write!(f, "(integer) {}", value),
            Reply::Bytes(data) => write!(f, "\"{}\"", String::from_utf8_lossy(data)),
            Reply::Status(text) => write!(f, "{}", text),
            Reply::Error(message) => write!(f, "(error) {}", message),
            Reply::Array(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Reply {
    fn from(value: i64) -> Self {
        Reply::Integer(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Reply::Bytes(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Reply {
    fn from(value: Vec<u8>) -> Self {
        Reply::Bytes(value)
    }
}

impl From<&[u8]> for Reply {
    fn from(value: &[u8]) -> Self {
        Reply::Bytes(value.to_vec())
    }
}

impl From<Vec<Reply>> for Reply {
    fn from(items: Vec<Reply>) -> Self {
        Reply::Array(items)
    }
}
