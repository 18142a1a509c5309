//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking data-access API over a pool of RESP2
//! connections.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides pooling and conversion details.
//! 2. **Explicit Ownership**: Each client owns its pool; there is no global.
//! 3. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 4. **Scoped Acquisition**: Every call checks out one connection and gives
//!    it back on every exit path.

use std::time::Duration;

use rkv_common::{RkvError, RkvResult};

use crate::conn::{Arg, Conn, DialOptions, RespConnection};
use crate::convert;
use crate::pool::{Pool, PoolConfig, PoolStats, PooledConnection};

/// TTL state returned by the server, mirroring Redis semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTtl {
    /// Key is missing or already expired.
    Missing,
    /// Key exists without expiration.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

/// Configuration for the synchronous client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum connections out at once (0 = unlimited).
    pub max_active: usize,
    /// Idle connections older than this are not reused.
    pub idle_timeout: Option<Duration>,
    /// How long to wait for a free connection; `None` waits forever.
    pub wait_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6379".to_string(),
            max_idle: 16,
            max_active: 0,
            idle_timeout: Some(Duration::from_secs(300)),
            wait_timeout: None,
            connect_timeout: Some(Duration::from_secs(1)),
            read_timeout: Some(Duration::from_secs(1)),
            write_timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// Synchronous key-value client backed by a connection pool.
#[derive(Clone)]
pub struct KVClient {
    pool: Pool<RespConnection>,
}

impl KVClient {
    /// Creates a client with default settings for the given address.
    pub fn connect(addr: impl Into<String>) -> Self {
        let config = ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    ///
    /// No connection is opened until the first command.
    pub fn with_config(config: ClientConfig) -> Self {
        let ClientConfig {
            addr,
            max_idle,
            max_active,
            idle_timeout,
            wait_timeout,
            connect_timeout,
            read_timeout,
            write_timeout,
        } = config;
        let options = DialOptions {
            connect_timeout,
            read_timeout,
            write_timeout,
        };
        let pool = Pool::new(
            PoolConfig {
                max_idle,
                max_active,
                idle_timeout,
                wait_timeout,
            },
            move || RespConnection::dial(&addr, &options),
        );
        KVClient { pool }
    }

    /// Checks out a raw pooled connection for commands the client lacks.
    pub fn conn(&self) -> RkvResult<PooledConnection<RespConnection>> {
        self.pool.get()
    }

    /// Fetches a value as text.
    ///
    /// A missing key is reported as [`RkvError::Nil`].
    pub fn get_data(&self, key: &str) -> RkvResult<String> {
        let mut conn = self.pool.get()?;
        convert::string(conn.exec("GET", &[Arg::from(key)]))
    }

    /// Fetches a value by key.
    ///
    /// Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> RkvResult<Option<Vec<u8>>> {
        let mut conn = self.pool.get()?;
        match convert::bytes(conn.exec("GET", &[Arg::from(key)])) {
            Ok(data) => Ok(Some(data)),
            Err(RkvError::Nil) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Fetches several values; missing keys come back as empty strings.
    pub fn mget(&self, keys: &[&str]) -> RkvResult<Vec<String>> {
        let args: Vec<Arg<'_>> = keys.iter().map(|key| Arg::from(*key)).collect();
        let mut conn = self.pool.get()?;
        convert::strings(conn.exec("MGET", &args))
    }

    /// Sets a value for a key without expiration.
    pub fn set(&self, key: &[u8], value: &[u8]) -> RkvResult<()> {
        let mut conn = self.pool.get()?;
        convert::string(conn.exec("SET", &[Arg::from(key), Arg::from(value)]))?;
        Ok(())
    }

    /// Deletes a key. Returns true when a key was removed.
    pub fn delete(&self, key: &[u8]) -> RkvResult<bool> {
        let mut conn = self.pool.get()?;
        convert::boolean(conn.exec("DEL", &[Arg::from(key)]))
    }

    /// Returns true when the key exists.
    pub fn exists(&self, key: &[u8]) -> RkvResult<bool> {
        let mut conn = self.pool.get()?;
        convert::boolean(conn.exec("EXISTS", &[Arg::from(key)]))
    }

    /// Increments an integer value and returns the new value.
    pub fn incr(&self, key: &[u8]) -> RkvResult<i64> {
        let mut conn = self.pool.get()?;
        convert::int64(conn.exec("INCR", &[Arg::from(key)]))
    }

    /// Sets a time-to-live on a key. Returns true when the TTL was set.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> RkvResult<bool> {
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let mut conn = self.pool.get()?;
        convert::boolean(conn.exec("EXPIRE", &[Arg::from(key), Arg::from(seconds)]))
    }

    /// Returns TTL status for a key.
    pub fn ttl(&self, key: &[u8]) -> RkvResult<ClientTtl> {
        let mut conn = self.pool.get()?;
        match convert::int64(conn.exec("TTL", &[Arg::from(key)]))? {
            -2 => Ok(ClientTtl::Missing),
            -1 => Ok(ClientTtl::NoExpiry),
            value => convert::uint64(Ok(value.into()))
                .map(|secs| ClientTtl::ExpiresIn(Duration::from_secs(secs))),
        }
    }

    /// Pings the server. Returns the raw response payload.
    pub fn ping(&self, payload: Option<&[u8]>) -> RkvResult<Vec<u8>> {
        let mut conn = self.pool.get()?;
        let response = match payload {
            Some(data) => conn.exec("PING", &[Arg::from(data)]),
            None => conn.exec("PING", &[]),
        };
        convert::bytes(response)
    }

    /// Returns pool counters.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Closes idle connections; later calls fail with `PoolClosed`.
    pub fn close(&self) {
        self.pool.close();
    }
}
