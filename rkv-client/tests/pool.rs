use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use rkv_client::{
    Arg, Conn, Pool, PoolConfig, PoolStats, Reply, RkvError, RkvResult, DEFAULT_MAX_IDLE,
};

/// In-memory connection that answers every command with its own id.
struct FakeConn {
    id: i64,
    closed: Arc<AtomicUsize>,
    sticky: Option<String>,
    is_closed: bool,
}

impl Conn for FakeConn {
    fn exec(&mut self, cmd: &str, _args: &[Arg<'_>]) -> RkvResult<Reply> {
        if let Some(cause) = &self.sticky {
            return Err(RkvError::Tainted(cause.clone()));
        }
        if cmd == "BREAK" {
            self.sticky = Some("broken pipe".into());
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe").into());
        }
        Ok(Reply::Integer(self.id))
    }

    fn err(&self) -> Option<&str> {
        self.sticky.as_deref()
    }

    fn close(&mut self) -> RkvResult<()> {
        if !self.is_closed {
            self.is_closed = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct Harness {
    pool: Pool<FakeConn>,
    dialed: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

fn harness(config: PoolConfig) -> Harness {
    let dialed = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let dial_count = dialed.clone();
    let close_count = closed.clone();
    let pool = Pool::new(config, move || {
        let id = dial_count.fetch_add(1, Ordering::SeqCst) as i64;
        Ok(FakeConn {
            id,
            closed: close_count.clone(),
            sticky: None,
            is_closed: false,
        })
    });
    Harness {
        pool,
        dialed,
        closed,
    }
}

fn conn_id<C: Conn>(conn: &mut C) -> i64 {
    match conn.exec("ID", &[]).expect("exec") {
        Reply::Integer(id) => id,
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn most_recently_returned_connection_is_reused_first() {
    let h = harness(PoolConfig::default());
    let mut a = h.pool.get().expect("get a");
    let mut b = h.pool.get().expect("get b");
    assert_eq!(conn_id(&mut a), 0);
    assert_eq!(conn_id(&mut b), 1);

    drop(a);
    drop(b);

    let mut first = h.pool.get().expect("get");
    let mut second = h.pool.get().expect("get");
    assert_eq!(conn_id(&mut first), 1);
    assert_eq!(conn_id(&mut second), 0);
    assert_eq!(h.dialed.load(Ordering::SeqCst), 2);
}

#[test]
fn stale_idle_connection_is_discarded_and_redialed() {
    let h = harness(PoolConfig {
        idle_timeout: Some(Duration::from_millis(20)),
        ..PoolConfig::default()
    });
    drop(h.pool.get().expect("get"));
    assert_eq!(h.pool.stats().idle, 1);

    thread::sleep(Duration::from_millis(60));

    let mut conn = h.pool.get().expect("get");
    assert_eq!(conn_id(&mut conn), 1);
    assert_eq!(h.closed.load(Ordering::SeqCst), 1);
    assert_eq!(h.pool.stats(), PoolStats { active: 1, idle: 0 });
}

#[test]
fn fresh_idle_connection_is_reused_within_timeout() {
    let h = harness(PoolConfig {
        idle_timeout: Some(Duration::from_secs(60)),
        ..PoolConfig::default()
    });
    drop(h.pool.get().expect("get"));
    let mut conn = h.pool.get().expect("get");
    assert_eq!(conn_id(&mut conn), 0);
    assert_eq!(h.dialed.load(Ordering::SeqCst), 1);
}

#[test]
fn lazy_expiry_stops_at_first_fresh_idle_connection() {
    let h = harness(PoolConfig {
        idle_timeout: Some(Duration::from_millis(50)),
        ..PoolConfig::default()
    });
    let older = h.pool.get().expect("get");
    let newer = h.pool.get().expect("get");
    drop(older);
    thread::sleep(Duration::from_millis(100));
    drop(newer);
    assert_eq!(h.pool.stats().idle, 2);

    let mut fresh = h.pool.get().expect("get");
    assert_eq!(conn_id(&mut fresh), 1);
    assert_eq!(h.pool.stats(), PoolStats { active: 1, idle: 1 });
    assert_eq!(h.closed.load(Ordering::SeqCst), 0);

    let mut redialed = h.pool.get().expect("get");
    assert_eq!(conn_id(&mut redialed), 2);
    assert_eq!(h.closed.load(Ordering::SeqCst), 1);
    assert_eq!(h.pool.stats(), PoolStats { active: 2, idle: 0 });
}

#[test]
fn tainted_connection_is_closed_not_pooled() {
    let h = harness(PoolConfig::default());
    let mut conn = h.pool.get().expect("get");
    assert!(conn.exec("BREAK", &[]).is_err());
    assert!(conn.err().is_some());
    assert!(matches!(conn.exec("ID", &[]), Err(RkvError::Tainted(_))));
    drop(conn);

    assert_eq!(h.pool.stats(), PoolStats { active: 0, idle: 0 });
    assert_eq!(h.closed.load(Ordering::SeqCst), 1);

    let mut conn = h.pool.get().expect("get");
    assert_eq!(conn_id(&mut conn), 1);
}

#[test]
fn surplus_connections_beyond_max_idle_are_closed() {
    let h = harness(PoolConfig {
        max_idle: 1,
        ..PoolConfig::default()
    });
    let a = h.pool.get().expect("get");
    let b = h.pool.get().expect("get");
    drop(a);
    drop(b);
    assert_eq!(h.pool.stats(), PoolStats { active: 0, idle: 1 });
    assert_eq!(h.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn zero_max_idle_keeps_default_number_of_idle_connections() {
    let h = harness(PoolConfig::default());
    let conns: Vec<_> = (0..DEFAULT_MAX_IDLE + 2)
        .map(|_| h.pool.get().expect("get"))
        .collect();
    drop(conns);
    assert_eq!(h.pool.stats().idle, DEFAULT_MAX_IDLE);
    assert_eq!(h.closed.load(Ordering::SeqCst), 2);
}

#[test]
fn explicit_close_returns_connection_once() {
    let h = harness(PoolConfig::default());
    let mut conn = h.pool.get().expect("get");
    conn.close().expect("close");
    conn.close().expect("second close is a no-op");
    assert!(matches!(conn.exec("ID", &[]), Err(RkvError::Closed)));
    drop(conn);
    assert_eq!(h.pool.stats(), PoolStats { active: 0, idle: 1 });
}

#[test]
fn exhausted_pool_fails_immediately_with_zero_wait() {
    let h = harness(PoolConfig {
        max_active: 1,
        wait_timeout: Some(Duration::ZERO),
        ..PoolConfig::default()
    });
    let _held = h.pool.get().expect("get");
    assert!(matches!(h.pool.get(), Err(RkvError::PoolExhausted)));
    assert_eq!(h.dialed.load(Ordering::SeqCst), 1);
}

#[test]
fn exhausted_pool_waits_for_budget_then_fails() {
    let h = harness(PoolConfig {
        max_active: 1,
        wait_timeout: Some(Duration::from_millis(50)),
        ..PoolConfig::default()
    });
    let _held = h.pool.get().expect("get");
    let started = Instant::now();
    assert!(matches!(h.pool.get(), Err(RkvError::PoolExhausted)));
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn blocked_get_resumes_when_slot_frees() {
    let h = harness(PoolConfig {
        max_active: 1,
        ..PoolConfig::default()
    });
    let mut held = h.pool.get().expect("get");
    assert_eq!(conn_id(&mut held), 0);

    let (tx, rx) = mpsc::channel();
    let pool = h.pool.clone();
    let waiter = thread::spawn(move || {
        let mut conn = pool.get().expect("get after release");
        tx.send(conn_id(&mut conn)).expect("send");
    });

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    drop(held);

    let id = rx.recv_timeout(Duration::from_secs(2)).expect("waiter woke");
    assert_eq!(id, 0);
    waiter.join().expect("join");
    assert_eq!(h.dialed.load(Ordering::SeqCst), 1);
}

#[test]
fn bounded_wait_succeeds_when_slot_frees_within_budget() {
    let h = harness(PoolConfig {
        max_active: 1,
        wait_timeout: Some(Duration::from_secs(2)),
        ..PoolConfig::default()
    });
    let held = h.pool.get().expect("get");

    let pool = h.pool.clone();
    let waiter = thread::spawn(move || {
        let started = Instant::now();
        let mut conn = pool.get().expect("get within budget");
        (conn_id(&mut conn), started.elapsed())
    });

    thread::sleep(Duration::from_millis(50));
    drop(held);

    let (id, waited) = waiter.join().expect("join");
    assert_eq!(id, 0);
    assert!(waited < Duration::from_secs(2));
    assert_eq!(h.dialed.load(Ordering::SeqCst), 1);
}

#[test]
fn outstanding_connections_never_exceed_max_active() {
    const MAX_ACTIVE: usize = 3;
    let h = harness(PoolConfig {
        max_idle: 2,
        max_active: MAX_ACTIVE,
        ..PoolConfig::default()
    });
    let outstanding = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let pool = h.pool.clone();
            let outstanding = outstanding.clone();
            let peak = peak.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let conn = pool.get().expect("get");
                    let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::yield_now();
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                    drop(conn);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("join");
    }

    assert!(peak.load(Ordering::SeqCst) <= MAX_ACTIVE);
    let stats = h.pool.stats();
    assert_eq!(stats.active, 0);
    assert!(stats.idle <= 2);
}

#[test]
fn dial_failure_is_reported_and_frees_the_slot() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let pool: Pool<FakeConn> = Pool::new(
        PoolConfig {
            max_active: 1,
            wait_timeout: Some(Duration::ZERO),
            ..PoolConfig::default()
        },
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        },
    );

    for _ in 0..2 {
        match pool.get() {
            Err(RkvError::Dial(err)) => assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused),
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("dial should fail"),
        }
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(pool.stats(), PoolStats { active: 0, idle: 0 });
}

#[test]
fn closed_pool_rejects_get_and_closes_returned_connections() {
    let h = harness(PoolConfig::default());
    let idle = h.pool.get().expect("get");
    let held = h.pool.get().expect("get");
    drop(idle);

    h.pool.close();
    assert_eq!(h.closed.load(Ordering::SeqCst), 1);
    assert!(matches!(h.pool.get(), Err(RkvError::PoolClosed)));

    drop(held);
    assert_eq!(h.closed.load(Ordering::SeqCst), 2);
    assert_eq!(h.pool.stats(), PoolStats { active: 0, idle: 0 });
    h.pool.close();
}

#[test]
fn close_wakes_blocked_waiters() {
    let h = harness(PoolConfig {
        max_active: 1,
        ..PoolConfig::default()
    });
    let _held = h.pool.get().expect("get");
    let pool = h.pool.clone();
    let waiter = thread::spawn(move || pool.get().map(|_| ()));

    thread::sleep(Duration::from_millis(50));
    h.pool.close();
    let result = waiter.join().expect("join");
    assert!(matches!(result, Err(RkvError::PoolClosed)));
}
