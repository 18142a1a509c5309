//! # Connection Pool
//!
//! Purpose: Reuse connections across callers to avoid repeated dials, while
//! bounding how many are checked out at once.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded stack of reusable connections;
//!    the most recently returned one is handed out first to keep it warm.
//! 2. **Minimal Locking**: Hold the mutex only for list and counter updates,
//!    never across a dial or a close.
//! 3. **Lazy Expiry**: Idle timeouts are checked at `get`, no background sweep.
//! 4. **Scoped Release**: [`PooledConnection`] returns itself on drop, so every
//!    exit path gives the slot back.

use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rkv_common::{Reply, RkvError, RkvResult};
use tracing::{debug, trace};

use crate::conn::{Arg, Conn};

/// Idle connections retained when `max_idle` is left at zero.
pub const DEFAULT_MAX_IDLE: usize = 2;

/// Pool limits.
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Maximum number of idle connections to keep (0 = [`DEFAULT_MAX_IDLE`]).
    pub max_idle: usize,
    /// Maximum connections checked out or idle at once (0 = unlimited).
    pub max_active: usize,
    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Option<Duration>,
    /// How long `get` waits for a free slot; `None` waits forever.
    pub wait_timeout: Option<Duration>,
}

impl PoolConfig {
    fn effective_max_idle(&self) -> usize {
        if self.max_idle == 0 {
            DEFAULT_MAX_IDLE
        } else {
            self.max_idle
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections checked out (including ones being dialed).
    pub active: usize,
    /// Connections parked for reuse.
    pub idle: usize,
}

type DialFn<C> = dyn Fn() -> io::Result<C> + Send + Sync;

struct IdleConn<C> {
    conn: C,
    returned_at: Instant,
}

struct PoolState<C> {
    // Newest entry at the back.
    idle: Vec<IdleConn<C>>,
    active: usize,
    closed: bool,
}

struct PoolInner<C> {
    config: PoolConfig,
    dial: Box<DialFn<C>>,
    state: Mutex<PoolState<C>>,
    available: Condvar,
}

/// Connection pool handle.
///
/// Cloning is cheap and every clone shares the same connections.
pub struct Pool<C: Conn> {
    inner: Arc<PoolInner<C>>,
}

impl<C: Conn> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Pool {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Conn> Pool<C> {
    /// Creates a pool that opens new connections with `dial`.
    pub fn new<F>(config: PoolConfig, dial: F) -> Self
    where
        F: Fn() -> io::Result<C> + Send + Sync + 'static,
    {
        let state = PoolState {
            idle: Vec::with_capacity(config.effective_max_idle()),
            active: 0,
            closed: false,
        };
        Pool {
            inner: Arc::new(PoolInner {
                config,
                dial: Box::new(dial),
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        }
    }

    /// Checks out a connection, reusing an idle one when possible.
    ///
    /// Blocks while `max_active` connections are out, bounded by
    /// `wait_timeout`. Dial failures come back as [`RkvError::Dial`].
    pub fn get(&self) -> RkvResult<PooledConnection<C>> {
        let config = &self.inner.config;
        let deadline = config.wait_timeout.map(|wait| Instant::now() + wait);
        let mut stale = Vec::new();

        let mut state = self.inner.lock();
        loop {
            if state.closed {
                drop(state);
                close_all(stale);
                return Err(RkvError::PoolClosed);
            }

            let now = Instant::now();
            while let Some(entry) = state.idle.pop() {
                if self.is_stale(&entry, now) {
                    stale.push(entry.conn);
                    continue;
                }
                state.active += 1;
                drop(state);
                close_all(stale);
                trace!("reusing idle connection");
                return Ok(PooledConnection::new(self.inner.clone(), entry.conn));
            }

            if config.max_active == 0 || state.active + state.idle.len() < config.max_active {
                // Reserve the slot before dialing so concurrent callers see it.
                state.active += 1;
                break;
            }

            state = match deadline {
                None => self
                    .inner
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        drop(state);
                        close_all(stale);
                        debug!(max_active = config.max_active, "pool exhausted");
                        return Err(RkvError::PoolExhausted);
                    }
                    self.inner
                        .available
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
        drop(state);
        close_all(stale);

        match (self.inner.dial)() {
            Ok(conn) => {
                debug!("dialed new pooled connection");
                Ok(PooledConnection::new(self.inner.clone(), conn))
            }
            Err(err) => {
                debug!(error = %err, "dial failed");
                self.inner.release_slot();
                Err(RkvError::Dial(err))
            }
        }
    }

    /// Returns the current active and idle counts.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            active: state.active,
            idle: state.idle.len(),
        }
    }

    /// Closes idle connections and rejects further `get` calls.
    ///
    /// Connections still checked out are closed when they are released.
    pub fn close(&self) {
        let idle = {
            let mut state = self.inner.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.inner.available.notify_all();
        debug!(idle = idle.len(), "closing pool");
        close_all(idle.into_iter().map(|entry| entry.conn));
    }

    fn is_stale(&self, entry: &IdleConn<C>, now: Instant) -> bool {
        match self.inner.config.idle_timeout {
            Some(timeout) => now.saturating_duration_since(entry.returned_at) > timeout,
            None => false,
        }
    }
}

impl<C> PoolInner<C> {
    fn lock(&self) -> MutexGuard<'_, PoolState<C>> {
        // The state is plain counters and a list; a panic elsewhere cannot
        // leave it half-updated, so poisoning is ignored.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release_slot(&self) {
        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
        }
        self.available.notify_one();
    }
}

impl<C: Conn> PoolInner<C> {
    fn put(&self, conn: C) {
        let tainted = conn.err().is_some();
        let surplus = {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            let keep = !tainted
                && !state.closed
                && state.idle.len() < self.config.effective_max_idle();
            if keep {
                state.idle.push(IdleConn {
                    conn,
                    returned_at: Instant::now(),
                });
                None
            } else {
                Some(conn)
            }
        };
        self.available.notify_one();

        if let Some(conn) = surplus {
            trace!(tainted, "discarding returned connection");
            close_all(std::iter::once(conn));
        }
    }
}

fn close_all<C: Conn>(conns: impl IntoIterator<Item = C>) {
    for mut conn in conns {
        if let Err(err) = conn.close() {
            debug!(error = %err, "error closing discarded connection");
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop.
///
/// `close` (or dropping the wrapper) parks the connection for reuse unless
/// it is tainted, the idle list is full, or the pool has been closed.
pub struct PooledConnection<C: Conn> {
    pool: Arc<PoolInner<C>>,
    conn: Option<C>,
}

impl<C: Conn> PooledConnection<C> {
    fn new(pool: Arc<PoolInner<C>>, conn: C) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
        }
    }

    fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(conn);
        }
    }
}

impl<C: Conn> Conn for PooledConnection<C> {
    fn exec(&mut self, cmd: &str, args: &[Arg<'_>]) -> RkvResult<Reply> {
        match self.conn.as_mut() {
            Some(conn) => conn.exec(cmd, args),
            None => Err(RkvError::Closed),
        }
    }

    fn err(&self) -> Option<&str> {
        match &self.conn {
            Some(conn) => conn.err(),
            None => Some("connection returned to pool"),
        }
    }

    fn close(&mut self) -> RkvResult<()> {
        self.release();
        Ok(())
    }
}

impl<C: Conn> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        self.release();
    }
}
