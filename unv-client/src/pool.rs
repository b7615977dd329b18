//! # Connection Pool
//!
//! Purpose: Reuse connections to one server, bound the number of requests in
//! flight, and keep unhealthy or stale sockets out of circulation.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Idle connections wait in a FIFO and are handed
//!    out oldest-first.
//! 2. **Admission Before Allocation**: A semaphore of `2 * conn_pool_size`
//!    permits caps concurrent holders. A holder beyond the pool size gets a
//!    non-pooled connection that is closed on release.
//! 3. **Minimal Locking**: The mutex only guards the idle queue and the set of
//!    pooled ids. It is never held across an await.
//! 4. **Validate on Checkout**: Idle connections are probed and aged before
//!    they are handed out, so half-closed sockets never reach a request.
//!
//! ## Usage Notes
//! - Connections come back either through [`ConnectionPool::release`] or by
//!   dropping the [`PooledConnection`]; the admission permit is freed exactly
//!   once either way.
//! - Dropping a connection mid-request leaves it flagged unhealthy, so it is
//!   discarded rather than reused.

use std::collections::{HashSet, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::connection::{compose_deadline, dial, ConnId, Connection, Connector, Liveness};
use crate::context::Context;
use crate::error::{ClientError, ClientResult};
use crate::options::Options;

/// Point-in-time counters for a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Pooled connections currently open, idle or in use.
    pub open: usize,
    pub idle: usize,
    /// Admission permits currently held.
    pub in_flight: usize,
    pub created: u64,
    pub reused: u64,
    pub discarded: u64,
    pub wait_timeouts: u64,
}

struct PoolState {
    idle: VecDeque<Connection>,
    tracked: HashSet<ConnId>,
}

struct PoolInner {
    options: Options,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    admission: Arc<Semaphore>,
    closed: AtomicBool,
    next_id: AtomicU64,
    created: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
    wait_timeouts: AtomicU64,
}

/// Connection pool handle. Clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates an empty pool. No connection is dialed until the first acquire.
    ///
    /// `options` are used as given; see [`Options::normalize`].
    pub fn new(options: Options, connector: Arc<dyn Connector>) -> ClientResult<Self> {
        if options.conn_pool_size == 0 {
            return Err(ClientError::ConnConfigFailed {
                reason: "connection pool size must be at least 1".to_string(),
            });
        }
        let state = PoolState {
            idle: VecDeque::with_capacity(options.conn_pool_size.min(1024)),
            tracked: HashSet::new(),
        };
        let admission = Arc::new(Semaphore::new(options.admission_capacity()));
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                options,
                connector,
                state: Mutex::new(state),
                admission,
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                created: AtomicU64::new(0),
                reused: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
                wait_timeouts: AtomicU64::new(0),
            }),
        })
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Acquires a connection, waiting at most `conn_wait_timeout` for a turn.
    pub async fn acquire(&self, ctx: &Context) -> ClientResult<PooledConnection> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Err(ClientError::PoolClosed);
        }
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let permit = self.wait_turn(ctx).await?;

        loop {
            let candidate = inner.state.lock().idle.pop_front();
            let Some(mut conn) = candidate else { break };

            let now = Instant::now();
            match inner.reject_reason(&conn, now) {
                None => {
                    conn.set_in_use(true);
                    conn.touch(now);
                    inner.reused.fetch_add(1, Ordering::Relaxed);
                    return Ok(PooledConnection::new(Arc::clone(inner), conn, permit));
                }
                Some(reason) => inner.discard(conn, reason),
            }
        }

        let mut conn = inner.create().await?;
        conn.set_in_use(true);
        Ok(PooledConnection::new(Arc::clone(inner), conn, permit))
    }

    async fn wait_turn(&self, ctx: &Context) -> ClientResult<OwnedSemaphorePermit> {
        let inner = &self.inner;
        match Arc::clone(&inner.admission).try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(ClientError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {}
        }

        let wait = inner.options.conn_wait_timeout;
        debug!(?wait, "admission queue full, waiting for a turn");
        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            permit = Arc::clone(&inner.admission).acquire_owned() => {
                permit.map_err(|_| ClientError::PoolClosed)
            }
            _ = time::sleep(wait) => {
                inner.wait_timeouts.fetch_add(1, Ordering::Relaxed);
                Err(ClientError::ConnWaitTimeout(wait))
            }
        }
    }

    /// Returns a connection to the pool. Fails only with `PoolClosed`.
    ///
    /// The admission permit is freed whatever the outcome.
    pub fn release(&self, conn: PooledConnection) -> ClientResult<()> {
        conn.release()
    }

    /// Closes the pool and every idle connection.
    ///
    /// Later calls to `acquire`, `release` and `close` report `PoolClosed`.
    /// Connections in use are closed when they come back.
    pub async fn close(&self) -> ClientResult<()> {
        let inner = &self.inner;
        if inner
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::PoolClosed);
        }
        inner.admission.close();

        let idle: Vec<Connection> = {
            let mut state = inner.state.lock();
            state.tracked.clear();
            state.idle.drain(..).collect()
        };

        let count = idle.len();
        let mut first_err = None;
        for conn in idle {
            let id = conn.id();
            let deadline = compose_deadline(Instant::now(), None, inner.options.write_timeout);
            if let Err(err) = conn.close(deadline).await {
                warn!(conn_id = id, error = %err, "failed to close idle connection");
                first_err.get_or_insert(err);
            }
        }

        info!(closed = count, "connection pool closed");
        match first_err {
            Some(err) => Err(ClientError::SocketWriteFailed(err)),
            None => Ok(()),
        }
    }

    /// Drops idle connections that are expired or fail the liveness probe.
    pub fn prune_idle(&self) -> usize {
        let inner = &self.inner;
        let idle: Vec<Connection> = inner.state.lock().idle.drain(..).collect();

        let now = Instant::now();
        let mut pruned = 0;
        let mut keep = Vec::with_capacity(idle.len());
        for conn in idle {
            match inner.reject_reason(&conn, now) {
                None => keep.push(conn),
                Some(reason) => {
                    inner.discard(conn, reason);
                    pruned += 1;
                }
            }
        }

        let mut state = inner.state.lock();
        if inner.is_closed() {
            for conn in keep {
                state.tracked.remove(&conn.id());
            }
        } else {
            // Survivors go back in front of anything released meanwhile.
            for conn in keep.into_iter().rev() {
                state.idle.push_front(conn);
            }
        }
        pruned
    }

    /// Pooled connections currently open.
    pub fn len(&self) -> usize {
        self.inner.state.lock().tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn idle_len(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        let (open, idle) = {
            let state = inner.state.lock();
            (state.tracked.len(), state.idle.len())
        };
        let in_flight = inner
            .options
            .admission_capacity()
            .saturating_sub(inner.admission.available_permits());
        PoolStats {
            open,
            idle,
            in_flight: if inner.is_closed() { 0 } else { in_flight },
            created: inner.created.load(Ordering::Relaxed),
            reused: inner.reused.load(Ordering::Relaxed),
            discarded: inner.discarded.load(Ordering::Relaxed),
            wait_timeouts: inner.wait_timeouts.load(Ordering::Relaxed),
        }
    }
}

impl PoolInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Why an idle connection must not be handed out, if it must not.
    fn reject_reason(&self, conn: &Connection, now: Instant) -> Option<&'static str> {
        if let Some(lifetime) = self.options.conn_max_lifetime {
            if conn.age(now) >= lifetime {
                return Some("max lifetime reached");
            }
        }
        match conn.probe() {
            Liveness::Alive => None,
            Liveness::PeerClosed => Some("closed by peer"),
            Liveness::UnexpectedData => Some("unexpected data while idle"),
            Liveness::Failed(_) => Some("socket error"),
        }
    }

    /// Dials a new connection, pooled while the pool has room for it.
    async fn create(&self) -> ClientResult<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pooled = {
            let mut state = self.state.lock();
            if self.is_closed() {
                return Err(ClientError::PoolClosed);
            }
            if state.tracked.len() < self.options.conn_pool_size {
                state.tracked.insert(id);
                true
            } else {
                false
            }
        };

        let transport = match dial(self.connector.as_ref(), &self.options).await {
            Ok(transport) => transport,
            Err(err) => {
                self.untrack(id);
                warn!(addr = %self.options.host_addr, error = %err, "failed to open connection");
                return Err(err);
            }
        };

        let conn = Connection::new(id, transport, pooled);
        if self.is_closed() {
            self.untrack(id);
            return Err(ClientError::PoolClosed);
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id = id, pooled, "opened connection");
        Ok(conn)
    }

    fn put_back(&self, mut conn: Connection) -> ClientResult<()> {
        conn.set_in_use(false);

        let reason = if conn.buffered_len() > 0 {
            Some("unread bytes buffered")
        } else if !conn.is_pooled() {
            Some("non-pooled")
        } else if !conn.is_healthy() {
            Some("unhealthy")
        } else {
            None
        };
        if let Some(reason) = reason {
            let closed = self.is_closed();
            self.discard(conn, reason);
            return if closed { Err(ClientError::PoolClosed) } else { Ok(()) };
        }

        let mut state = self.state.lock();
        if self.is_closed() {
            state.tracked.remove(&conn.id());
            return Err(ClientError::PoolClosed);
        }
        if state.idle.len() < self.options.conn_pool_size {
            state.idle.push_back(conn);
            return Ok(());
        }
        state.tracked.remove(&conn.id());
        drop(state);
        self.discarded.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id = conn.id(), "idle queue full, closing connection");
        Ok(())
    }

    fn discard(&self, conn: Connection, reason: &'static str) {
        if conn.is_pooled() {
            self.untrack(conn.id());
        }
        self.discarded.fetch_add(1, Ordering::Relaxed);
        debug!(conn_id = conn.id(), reason, "discarding connection");
    }

    fn untrack(&self, id: ConnId) {
        self.state.lock().tracked.remove(&id);
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection, permit: OwnedSemaphorePermit) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            _permit: permit,
        }
    }

    /// Returns the connection to its pool now and reports the outcome.
    pub fn release(mut self) -> ClientResult<()> {
        match self.conn.take() {
            Some(conn) => self.pool.put_back(conn),
            None => Ok(()),
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until released")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until released")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = self.pool.put_back(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio_util::sync::CancellationToken;

    use crate::error::ErrorKind;
    use crate::test_support::MockConnector;

    fn pool_with(size: usize, connector: &Arc<MockConnector>) -> ConnectionPool {
        let options = Options {
            conn_pool_size: size,
            conn_wait_timeout: Duration::from_millis(100),
            ..Options::new("mock:11191")
        };
        ConnectionPool::new(options, Arc::clone(connector) as Arc<dyn Connector>).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_released_connection() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(2, &connector);
        let ctx = Context::background();

        let conn = pool.acquire(&ctx).await.unwrap();
        let id = conn.id();
        assert!(conn.in_use());
        pool.release(conn).unwrap();
        assert_eq!(pool.idle_len(), 1);

        let again = pool.acquire(&ctx).await.unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(connector.dial_count(), 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connections_are_handed_out_oldest_first() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(3, &connector);
        let ctx = Context::background();

        let first = pool.acquire(&ctx).await.unwrap();
        let second = pool.acquire(&ctx).await.unwrap();
        let (first_id, second_id) = (first.id(), second.id());
        pool.release(first).unwrap();
        pool.release(second).unwrap();

        assert_eq!(pool.acquire(&ctx).await.unwrap().id(), first_id);
        let next = pool.acquire(&ctx).await.unwrap();
        assert!(next.id() == first_id || next.id() == second_id);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_with_unread_bytes_is_not_reused() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(2, &connector);
        let ctx = Context::background();

        let mut conn = pool.acquire(&ctx).await.unwrap();
        let mut peer = connector.take_peer().unwrap();
        peer.write_all(b"stray bytes").await.unwrap();
        let mut one = [0u8; 1];
        conn.read(&mut one, None).await.unwrap();
        assert!(conn.buffered_len() > 0);

        pool.release(conn).unwrap();
        assert_eq!(pool.idle_len(), 0);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.stats().discarded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_connection_is_discarded() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(2, &connector);
        let ctx = Context::background();

        let mut conn = pool.acquire(&ctx).await.unwrap();
        conn.set_healthy(false);
        drop(conn);

        assert_eq!(pool.idle_len(), 0);
        pool.acquire(&ctx).await.unwrap();
        assert_eq!(connector.dial_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_connection_is_replaced() {
        let connector = Arc::new(MockConnector::silent());
        let options = Options {
            conn_pool_size: 2,
            conn_max_lifetime: Some(Duration::from_secs(60)),
            ..Options::new("mock:11191")
        };
        let pool = ConnectionPool::new(options, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();
        let ctx = Context::background();

        let conn = pool.acquire(&ctx).await.unwrap();
        let old_id = conn.id();
        pool.release(conn).unwrap();

        time::advance(Duration::from_secs(61)).await;
        let fresh = pool.acquire(&ctx).await.unwrap();
        assert_ne!(fresh.id(), old_id);
        assert_eq!(connector.dial_count(), 2);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_failing_liveness_check_is_replaced() {
        let failures = [
            Liveness::PeerClosed,
            Liveness::UnexpectedData,
            Liveness::Failed(io::ErrorKind::ConnectionReset),
        ];
        for liveness in failures {
            let connector = Arc::new(MockConnector::silent());
            let pool = pool_with(2, &connector);
            let ctx = Context::background();

            let conn = pool.acquire(&ctx).await.unwrap();
            pool.release(conn).unwrap();
            connector.set_liveness(liveness);

            let fresh = pool.acquire(&ctx).await.unwrap();
            assert_eq!(connector.dial_count(), 2, "{liveness:?}");
            assert_eq!(fresh.id(), 2, "{liveness:?}");
            assert_eq!(pool.stats().discarded, 1, "{liveness:?}");
            assert_eq!(pool.len(), 1, "{liveness:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unnormalized_huge_timeouts_do_not_overflow() {
        let connector = Arc::new(MockConnector::silent());
        let options = Options {
            conn_pool_size: 1,
            dial_timeout: Some(Duration::MAX),
            read_timeout: Some(Duration::MAX),
            write_timeout: Some(Duration::MAX),
            ..Options::new("mock:11191")
        };
        let pool = ConnectionPool::new(options, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();

        let mut conn = pool.acquire(&Context::background()).await.unwrap();
        assert_eq!(conn.deadline(None, Some(Duration::MAX)), None);
        pool.release(conn).unwrap();
        pool.close().await.unwrap();
        assert!(pool.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn pool_size_acquires_do_not_wait() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(3, &connector);
        let ctx = Context::background();

        let start = Instant::now();
        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(pool.acquire(&ctx).await.unwrap());
        }
        assert_eq!(Instant::now(), start);
        assert!(held.iter().all(|conn| conn.is_pooled()));
        assert_eq!(pool.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn holders_beyond_pool_size_get_non_pooled_connections() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(2, &connector);
        let ctx = Context::background();

        let a = pool.acquire(&ctx).await.unwrap();
        let b = pool.acquire(&ctx).await.unwrap();
        let c = pool.acquire(&ctx).await.unwrap();
        assert!(a.is_pooled() && b.is_pooled());
        assert!(!c.is_pooled());

        pool.release(c).unwrap();
        assert_eq!(pool.idle_len(), 0);
        pool.release(a).unwrap();
        pool.release(b).unwrap();
        assert_eq!(pool.idle_len(), 2);
        assert!(pool.idle_len() <= pool.options().conn_pool_size);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_beyond_admission_times_out() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(2, &connector);
        let ctx = Context::background();

        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.acquire(&ctx).await.unwrap());
        }
        assert_eq!(pool.stats().in_flight, 4);

        let start = Instant::now();
        let err = pool.acquire(&ctx).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConnWaitTimeout);
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_millis(100) && waited < Duration::from_millis(200));
        assert_eq!(pool.stats().wait_timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_gets_turn_when_holder_releases() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(1, &connector);
        let ctx = Context::background();

        let a = pool.acquire(&ctx).await.unwrap();
        let _b = pool.acquire(&ctx).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(&Context::background()).await.map(|c| c.id()) })
        };
        time::sleep(Duration::from_millis(20)).await;
        let released_id = a.id();
        pool.release(a).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), released_id);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_admission_wait() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(1, &connector);
        let token = CancellationToken::new();
        let ctx = Context::background().cancelled_by(token.clone());

        let _a = pool.acquire(&ctx).await.unwrap();
        let _b = pool.acquire(&ctx).await.unwrap();

        let canceller = tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let err = pool.acquire(&ctx).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_interrupts_admission_wait() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(1, &connector);

        let _a = pool.acquire(&Context::background()).await.unwrap();
        let _b = pool.acquire(&Context::background()).await.unwrap();

        let ctx = Context::with_timeout(Duration::from_millis(30));
        let err = pool.acquire(&ctx).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dial_frees_the_slot() {
        let connector = Arc::new(MockConnector::failing(std::io::ErrorKind::ConnectionRefused));
        let options = Options {
            conn_pool_size: 1,
            max_retries: 0,
            ..Options::new("mock:11191")
        };
        let pool = ConnectionPool::new(options, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();

        for _ in 0..3 {
            let err = pool.acquire(&Context::background()).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::DialFailed);
        }
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.stats().in_flight, 0);
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let options = Options {
            conn_pool_size: 0,
            ..Options::default()
        };
        let err = ConnectionPool::new(options, Arc::new(MockConnector::silent()))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ConnConfigFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_terminal() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(2, &connector);
        let ctx = Context::background();

        let idle = pool.acquire(&ctx).await.unwrap();
        let busy = pool.acquire(&ctx).await.unwrap();
        pool.release(idle).unwrap();

        pool.close().await.unwrap();
        assert!(pool.is_closed());
        assert_eq!(pool.idle_len(), 0);

        assert_eq!(pool.close().await.unwrap_err().kind(), ErrorKind::PoolClosed);
        assert_eq!(pool.acquire(&ctx).await.err().unwrap().kind(), ErrorKind::PoolClosed);
        assert_eq!(pool.release(busy).unwrap_err().kind(), ErrorKind::PoolClosed);
        assert_eq!(pool.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_wakes_waiters() {
        let connector = Arc::new(MockConnector::silent());
        let pool = pool_with(1, &connector);
        let ctx = Context::background();

        let _a = pool.acquire(&ctx).await.unwrap();
        let _b = pool.acquire(&ctx).await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(&Context::background()).await.map(|c| c.id()) })
        };
        time::sleep(Duration::from_millis(10)).await;
        pool.close().await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap_err().kind(), ErrorKind::PoolClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_only_stale_connections() {
        let connector = Arc::new(MockConnector::silent());
        let options = Options {
            conn_pool_size: 4,
            conn_max_lifetime: Some(Duration::from_secs(60)),
            ..Options::new("mock:11191")
        };
        let pool = ConnectionPool::new(options, Arc::clone(&connector) as Arc<dyn Connector>).unwrap();
        let ctx = Context::background();

        let old = pool.acquire(&ctx).await.unwrap();
        time::advance(Duration::from_secs(45)).await;
        let young = pool.acquire(&ctx).await.unwrap();
        let young_id = young.id();
        pool.release(old).unwrap();
        pool.release(young).unwrap();

        time::advance(Duration::from_secs(20)).await;
        assert_eq!(pool.prune_idle(), 1);
        assert_eq!(pool.idle_len(), 1);
        assert_eq!(pool.acquire(&ctx).await.unwrap().id(), young_id);
    }
}
