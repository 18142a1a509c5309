//! # RKV Sync Client
//!
//! Purpose: Provide a synchronous client for a Redis-compatible store with
//! connection pooling and typed reply conversion.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections to avoid repeated connects.
//! 2. **Closed Reply Type**: Replies are a tagged variant; converters match
//!    exhaustively instead of probing types at runtime.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Protocol Clarity**: Encode/parse RESP2 explicitly for correctness.
//!
//! ## Example
//!
//! ```no_run
//! use rkv_client::{convert, Arg, Conn, KVClient};
//!
//! let client = KVClient::connect("127.0.0.1:6379");
//! let value = client.get_data("greeting")?;
//!
//! let mut conn = client.conn()?;
//! let hits = convert::int64(conn.exec("INCR", &[Arg::from("hits")]))?;
//! # let _ = (value, hits);
//! # Ok::<(), rkv_client::RkvError>(())
//! ```

mod client;
mod conn;
pub mod convert;
mod pool;
mod resp;

pub use client::{ClientConfig, ClientTtl, KVClient};
pub use conn::{Arg, Conn, DialOptions, RespConnection};
pub use pool::{Pool, PoolConfig, PoolStats, PooledConnection, DEFAULT_MAX_IDLE};
pub use resp::{encode_command, read_reply};
pub use rkv_common::{Reply, RkvError, RkvResult};
