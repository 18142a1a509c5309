// rkv-common - Shared reply and error types for the RKV client
//
// This crate defines the untyped reply value and the error taxonomy used by
// the pool, the connection, and the reply converters.

pub mod error;
pub mod reply;

// Re-export for convenience
pub use error::*;
pub use reply::*;
