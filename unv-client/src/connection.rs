//! # Connection
//!
//! Purpose: Own one socket with its read/write buffers and lifecycle
//! metadata, and apply per-operation deadlines to byte-level I/O.
//!
//! ## Design Principles
//! 1. **Narrow Capabilities**: Sockets are reached only through `Transport`
//!    (async read/write + `Probe`), so tests can substitute an in-memory stream.
//! 2. **Per-Operation Deadlines**: Read and write deadlines are derived again on
//!    every call, never fixed at creation.
//! 3. **Exclusive Ownership**: A `Connection` is moved, never shared or cloned.
//! 4. **Safe Degradation**: Targets without a raw probe report every socket as alive.

use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::options::Options;

/// Identifier assigned by the pool that created the connection.
pub type ConnId = u64;

/// Outcome of a non-blocking liveness check on an idle socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Nothing to read and no error: the peer is still there.
    Alive,
    /// Orderly shutdown by the peer.
    PeerClosed,
    /// Bytes arrived while idle, so the stream is out of step.
    UnexpectedData,
    /// The OS reported an error.
    Failed(io::ErrorKind),
}

impl Liveness {
    pub fn is_alive(self) -> bool {
        matches!(self, Liveness::Alive)
    }
}

/// Raw liveness check. Must not block and must not consume data.
pub trait Probe {
    fn probe(&self) -> Liveness;
}

/// Byte stream a [`Connection`] can run over.
pub trait Transport: AsyncRead + AsyncWrite + Probe + Send + Unpin {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Probe + Send + Unpin {}

#[cfg(unix)]
impl Probe for TcpStream {
    fn probe(&self) -> Liveness {
        use std::mem::ManuallyDrop;
        use std::os::fd::{AsRawFd, FromRawFd};

        // SAFETY: the descriptor stays owned by `self`, which outlives this
        // call; ManuallyDrop stops the temporary handle from closing it.
        let raw = ManuallyDrop::new(unsafe { std::net::TcpStream::from_raw_fd(self.as_raw_fd()) });

        // Tokio sockets are non-blocking, so MSG_PEEK returns immediately.
        let mut byte = [0u8; 1];
        match raw.peek(&mut byte) {
            Ok(0) => Liveness::PeerClosed,
            Ok(_) => Liveness::UnexpectedData,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Liveness::Alive,
            Err(err) => Liveness::Failed(err.kind()),
        }
    }
}

#[cfg(not(unix))]
impl Probe for TcpStream {
    fn probe(&self) -> Liveness {
        Liveness::Alive
    }
}

/// Opens transports to the configured address.
///
/// A TLS connector wraps the TCP stream here, before handing it to the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, addr: &str) -> ClientResult<Box<dyn Transport>>;
}

/// Plain TCP connector with Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: &str) -> ClientResult<Box<dyn Transport>> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::DialFailed {
                addr: addr.to_string(),
                source,
            })?;
        // Disable Nagle to keep request latency low for small payloads.
        stream
            .set_nodelay(true)
            .map_err(|err| ClientError::ConnConfigFailed {
                reason: format!("failed to set TCP_NODELAY for {addr}: {err}"),
            })?;
        Ok(Box::new(stream))
    }
}

/// Dials `options.host_addr`, retrying within one aggregate dial budget.
///
/// Reports `DialTimeout` when the budget ran out, otherwise the last attempt's
/// failure. Configuration failures are returned without retrying.
pub(crate) async fn dial(
    connector: &dyn Connector,
    options: &Options,
) -> ClientResult<Box<dyn Transport>> {
    let addr = options.host_addr.as_str();
    // A budget past the clock's range is the same as no budget.
    let budget = options
        .dial_timeout
        .and_then(|timeout| Instant::now().checked_add(timeout));
    let expired = || budget.is_some_and(|deadline| Instant::now() >= deadline);
    let attempts = options.max_retries.saturating_add(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        if attempt > 1 && !options.retry_backoff.is_zero() {
            match (Instant::now().checked_add(options.retry_backoff), budget) {
                (Some(wake), budget) => {
                    time::sleep_until(budget.map_or(wake, |deadline| wake.min(deadline))).await
                }
                (None, Some(deadline)) => time::sleep_until(deadline).await,
                (None, None) => time::sleep(options.retry_backoff).await,
            }
        }
        if expired() {
            break;
        }

        let result = match budget {
            Some(deadline) => match time::timeout_at(deadline, connector.connect(addr)).await {
                Ok(result) => result,
                Err(_) => break,
            },
            None => connector.connect(addr).await,
        };

        match result {
            Ok(transport) => {
                debug!(addr, attempt, "connection dialed");
                return Ok(transport);
            }
            Err(err @ ClientError::ConnConfigFailed { .. }) => return Err(err),
            Err(err) => {
                debug!(addr, attempt, error = %err, "dial attempt failed");
                last_err = Some(err);
            }
        }
    }

    if expired() {
        return Err(ClientError::DialTimeout {
            addr: addr.to_string(),
            timeout: options.dial_timeout.unwrap_or_default(),
        });
    }
    Err(last_err.unwrap_or_else(|| ClientError::DialFailed {
        addr: addr.to_string(),
        source: io::Error::new(io::ErrorKind::Other, "no dial attempt was made"),
    }))
}

/// Composes a caller deadline with a configured timeout.
///
/// The earlier of the two wins; with neither there is no deadline. A timeout
/// too large to add to `now` counts as no timeout.
pub fn compose_deadline(
    now: Instant,
    ctx_deadline: Option<Instant>,
    timeout: Option<Duration>,
) -> Option<Instant> {
    let local = timeout.and_then(|timeout| now.checked_add(timeout));
    match (ctx_deadline, local) {
        (Some(deadline), Some(local)) => Some(deadline.min(local)),
        (ctx_deadline, local) => ctx_deadline.or(local),
    }
}

async fn with_deadline<T, F>(deadline: Option<Instant>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match deadline {
        Some(deadline) => time::timeout_at(deadline, fut)
            .await
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::TimedOut, "i/o deadline exceeded"))),
        None => fut.await,
    }
}

/// One socket plus buffers and lifecycle metadata.
pub struct Connection {
    id: ConnId,
    // BufReader over BufWriter: reads are buffered, writes pass through to
    // the BufWriter and reach the socket on flush.
    io: BufReader<BufWriter<Box<dyn Transport>>>,
    created_at: Instant,
    used_at: Instant,
    in_use: bool,
    pooled: bool,
    healthy: bool,
}

impl Connection {
    pub(crate) fn new(id: ConnId, transport: Box<dyn Transport>, pooled: bool) -> Self {
        let now = Instant::now();
        Connection {
            id,
            io: BufReader::new(BufWriter::new(transport)),
            created_at: now,
            used_at: now,
            in_use: false,
            pooled,
            healthy: true,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn used_at(&self) -> Instant {
        self.used_at
    }

    pub fn in_use(&self) -> bool {
        self.in_use
    }

    /// True when the connection counts against the pool-size quota.
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// False after a request started but did not complete cleanly.
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Bytes read from the socket but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.io.buffer().len()
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Runs the raw probe on the underlying transport.
    pub fn probe(&self) -> Liveness {
        self.io.get_ref().get_ref().probe()
    }

    pub(crate) fn set_in_use(&mut self, in_use: bool) {
        self.in_use = in_use;
    }

    pub(crate) fn set_healthy(&mut self, healthy: bool) {
        self.healthy = healthy;
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        if now > self.used_at {
            self.used_at = now;
        }
    }

    /// Deadline for the next read or write. Also records the use.
    pub fn deadline(&mut self, ctx_deadline: Option<Instant>, timeout: Option<Duration>) -> Option<Instant> {
        let now = Instant::now();
        self.touch(now);
        compose_deadline(now, ctx_deadline, timeout)
    }

    /// Writes as much of `buf` as the socket accepts and returns the count.
    ///
    /// A count below `buf.len()` means the transport stopped accepting bytes.
    pub async fn write(&mut self, buf: &[u8], deadline: Option<Instant>) -> io::Result<usize> {
        let io = &mut self.io;
        with_deadline(deadline, async move {
            let mut written = 0;
            while written < buf.len() {
                let n = io.write(&buf[written..]).await?;
                if n == 0 {
                    break;
                }
                written += n;
            }
            Ok(written)
        })
        .await
    }

    pub async fn flush(&mut self, deadline: Option<Instant>) -> io::Result<()> {
        with_deadline(deadline, self.io.flush()).await
    }

    /// Reads up to `buf.len()` bytes. `Ok(0)` means end of stream.
    pub async fn read(&mut self, buf: &mut [u8], deadline: Option<Instant>) -> io::Result<usize> {
        with_deadline(deadline, self.io.read(buf)).await
    }

    /// Flushes and shuts the socket down, then drops it.
    pub async fn close(mut self, deadline: Option<Instant>) -> io::Result<()> {
        self.in_use = false;
        with_deadline(deadline, self.io.shutdown()).await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("used_at", &self.used_at)
            .field("in_use", &self.in_use)
            .field("pooled", &self.pooled)
            .field("healthy", &self.healthy)
            .field("buffered", &self.buffered_len())
            .finish()
    }
}
