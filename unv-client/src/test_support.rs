//! In-memory transports and connectors for unit tests.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use unv_common::{decode_prefix, encode, DecodeError, WireValue};

use crate::connection::{Connector, Liveness, Probe, Transport};
use crate::dispatch::RESPONSE_DELIMITER;
use crate::error::{ClientError, ClientResult};

const DUPLEX_CAPACITY: usize = 64 * 1024;

/// Write-side misbehavior of a [`MockTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteFault {
    None,
    /// Accepts this many bytes in total, then reports zero-length writes.
    AcceptOnly(usize),
    /// Writes go through but every flush fails.
    FailFlush,
}

/// Duplex stream with a liveness flag the test controls.
pub(crate) struct MockTransport {
    inner: DuplexStream,
    liveness: Arc<Mutex<Liveness>>,
    fault: WriteFault,
    accepted: usize,
}

impl AsyncRead for MockTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let buf = match this.fault {
            WriteFault::AcceptOnly(limit) => {
                let room = limit.saturating_sub(this.accepted);
                if room == 0 {
                    return Poll::Ready(Ok(0));
                }
                &buf[..buf.len().min(room)]
            }
            WriteFault::None | WriteFault::FailFlush => buf,
        };
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            this.accepted += n;
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.fault == WriteFault::FailFlush {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "flush refused")));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

impl Probe for MockTransport {
    fn probe(&self) -> Liveness {
        *self.liveness.lock()
    }
}

/// Returns a transport, the peer end of its stream, and its liveness flag.
pub(crate) fn mock_transport() -> (MockTransport, DuplexStream, Arc<Mutex<Liveness>>) {
    let liveness = Arc::new(Mutex::new(Liveness::Alive));
    let (inner, peer) = tokio::io::duplex(DUPLEX_CAPACITY);
    let transport = MockTransport {
        inner,
        liveness: Arc::clone(&liveness),
        fault: WriteFault::None,
        accepted: 0,
    };
    (transport, peer, liveness)
}

/// Encodes a standard `[value, code, message]` reply followed by the delimiter.
pub(crate) fn reply(value: WireValue, code: i64, message: &str) -> Vec<u8> {
    framed(WireValue::Array(vec![
        value,
        WireValue::Integer(code),
        WireValue::from(message),
    ]))
}

/// Encodes any value followed by the delimiter.
pub(crate) fn framed(value: WireValue) -> Vec<u8> {
    let mut out = encode(&value).expect("test value encodes");
    out.extend_from_slice(RESPONSE_DELIMITER);
    out
}

/// Maps a decoded request (`[name, args...]`) to raw response bytes.
pub(crate) type Handler = Arc<dyn Fn(WireValue) -> Vec<u8> + Send + Sync>;

enum Mode {
    Silent,
    Serve(Handler),
    Fail(io::ErrorKind),
    Hang,
    Misconfigure,
}

/// Connector handing out in-memory transports.
///
/// All transports from one connector share a single liveness flag.
pub(crate) struct MockConnector {
    mode: Mode,
    pub dials: Arc<AtomicUsize>,
    pub liveness: Arc<Mutex<Liveness>>,
    write_fault: Mutex<WriteFault>,
    peers: Mutex<Vec<DuplexStream>>,
}

impl MockConnector {
    fn with_mode(mode: Mode) -> Self {
        MockConnector {
            mode,
            dials: Arc::new(AtomicUsize::new(0)),
            liveness: Arc::new(Mutex::new(Liveness::Alive)),
            write_fault: Mutex::new(WriteFault::None),
            peers: Mutex::new(Vec::new()),
        }
    }

    /// Peers are parked and can be claimed with `take_peer`.
    pub(crate) fn silent() -> Self {
        MockConnector::with_mode(Mode::Silent)
    }

    /// Every transport gets a server task answering requests with `handler`.
    pub(crate) fn serving<F>(handler: F) -> Self
    where
        F: Fn(WireValue) -> Vec<u8> + Send + Sync + 'static,
    {
        MockConnector::with_mode(Mode::Serve(Arc::new(handler)))
    }

    pub(crate) fn failing(kind: io::ErrorKind) -> Self {
        MockConnector::with_mode(Mode::Fail(kind))
    }

    pub(crate) fn hanging() -> Self {
        MockConnector::with_mode(Mode::Hang)
    }

    pub(crate) fn misconfigured() -> Self {
        MockConnector::with_mode(Mode::Misconfigure)
    }

    pub(crate) fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub(crate) fn set_liveness(&self, liveness: Liveness) {
        *self.liveness.lock() = liveness;
    }

    /// Applies to transports dialed after the call.
    pub(crate) fn set_write_fault(&self, fault: WriteFault) {
        *self.write_fault.lock() = fault;
    }

    /// Claims the peer end of the most recently dialed silent transport.
    pub(crate) fn take_peer(&self) -> Option<DuplexStream> {
        self.peers.lock().pop()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, addr: &str) -> ClientResult<Box<dyn Transport>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let handler = match &self.mode {
            Mode::Fail(kind) => {
                return Err(ClientError::DialFailed {
                    addr: addr.to_string(),
                    source: io::Error::from(*kind),
                })
            }
            Mode::Hang => std::future::pending().await,
            Mode::Misconfigure => {
                return Err(ClientError::ConnConfigFailed {
                    reason: "mock refuses socket options".to_string(),
                })
            }
            Mode::Silent => None,
            Mode::Serve(handler) => Some(Arc::clone(handler)),
        };

        let (inner, peer) = tokio::io::duplex(DUPLEX_CAPACITY);
        let transport = MockTransport {
            inner,
            liveness: Arc::clone(&self.liveness),
            fault: *self.write_fault.lock(),
            accepted: 0,
        };
        match handler {
            Some(handler) => {
                tokio::spawn(serve(peer, handler));
            }
            None => self.peers.lock().push(peer),
        }
        Ok(Box::new(transport))
    }
}

/// Decodes back-to-back requests from `peer` and writes each handler response.
async fn serve(mut peer: DuplexStream, handler: Handler) {
    let mut pending = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = match peer.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&chunk[..n]);

        loop {
            match decode_prefix(&pending) {
                Ok((request, used)) => {
                    pending.drain(..used);
                    let response = handler(request);
                    if peer.write_all(&response).await.is_err() {
                        return;
                    }
                }
                Err(DecodeError::UnexpectedEof) => break,
                Err(_) => return,
            }
        }
    }
}

/// Command name and arguments of a decoded request.
pub(crate) fn split_request(request: WireValue) -> (String, Vec<WireValue>) {
    match request {
        WireValue::Array(mut items) if !items.is_empty() => {
            let name = match items.remove(0) {
                WireValue::String(name) => name,
                other => panic!("command name must be a string, got {other:?}"),
            };
            (name, items)
        }
        other => panic!("request must be a non-empty array, got {other:?}"),
    }
}
