//! Error types for the Universum client.
//!
//! Every fallible operation returns [`ClientResult`]. Each [`ClientError`]
//! variant belongs to exactly one [`ErrorKind`], so callers can branch on the
//! kind without matching on context fields.
//!
//! | Category | Kinds |
//! |----------|-------|
//! | Dial | `DialFailed`, `DialTimeout`, `ConnConfigFailed` |
//! | Pool | `ConnWaitTimeout`, `PoolClosed`, `Cancelled`, `DeadlineExceeded` |
//! | Socket | `SocketWriteFailed`, `IncompleteSocketWrite`, `SocketFlushFailed`, `SocketReadFailed` |
//! | Protocol | `CommandEncodingFailed`, `MalformedResponse`, `ServerRejectedRequest` |
//! | Command | `ClientReadonly`, `InvalidDatatype` |

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use unv_common::{DecodeError, EncodeError};

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Every dial attempt failed before the dial budget ran out.
    #[error("failed to dial host {addr}: {source}")]
    DialFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The aggregate dial budget expired.
    #[error("dial to host {addr} timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    /// No admission slot became free within the wait timeout.
    #[error("timed out after {0:?} waiting for a turn in the connection pool")]
    ConnWaitTimeout(Duration),

    /// Socket or pool configuration was rejected.
    #[error("connection configuration failed: {reason}")]
    ConnConfigFailed { reason: String },

    #[error("connection pool is closed")]
    PoolClosed,

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The caller's deadline passed before the request could proceed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("command encoding failed: {0}")]
    CommandEncodingFailed(#[from] EncodeError),

    #[error("failed while writing to the socket: {0}")]
    SocketWriteFailed(#[source] io::Error),

    #[error("incomplete socket write: wrote {written}/{expected} bytes")]
    IncompleteSocketWrite { written: usize, expected: usize },

    #[error("failed to flush the socket writer: {0}")]
    SocketFlushFailed(#[source] io::Error),

    #[error("failed while reading from the socket: {0}")]
    SocketReadFailed(#[source] io::Error),

    /// The reply could not be decoded.
    #[error("malformed response: {0}")]
    UndecodableResponse(#[from] DecodeError),

    /// The reply decoded but does not have the expected shape.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// The server answered with an error value.
    #[error("server rejected the request: {message}")]
    ServerRejectedRequest { message: String },

    #[error("cannot execute a write command on a read-only client")]
    ClientReadonly,

    #[error("unsupported datatype for write: {0}")]
    InvalidDatatype(&'static str),
}

impl ClientError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ClientError::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::DialFailed { .. } => ErrorKind::DialFailed,
            ClientError::DialTimeout { .. } => ErrorKind::DialTimeout,
            ClientError::ConnWaitTimeout(_) => ErrorKind::ConnWaitTimeout,
            ClientError::ConnConfigFailed { .. } => ErrorKind::ConnConfigFailed,
            ClientError::PoolClosed => ErrorKind::PoolClosed,
            ClientError::Cancelled => ErrorKind::Cancelled,
            ClientError::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            ClientError::CommandEncodingFailed(_) => ErrorKind::CommandEncodingFailed,
            ClientError::SocketWriteFailed(_) => ErrorKind::SocketWriteFailed,
            ClientError::IncompleteSocketWrite { .. } => ErrorKind::IncompleteSocketWrite,
            ClientError::SocketFlushFailed(_) => ErrorKind::SocketFlushFailed,
            ClientError::SocketReadFailed(_) => ErrorKind::SocketReadFailed,
            ClientError::UndecodableResponse(_) | ClientError::MalformedResponse { .. } => {
                ErrorKind::MalformedResponse
            }
            ClientError::ServerRejectedRequest { .. } => ErrorKind::ServerRejectedRequest,
            ClientError::ClientReadonly => ErrorKind::ClientReadonly,
            ClientError::InvalidDatatype(_) => ErrorKind::InvalidDatatype,
        }
    }

    /// True for faults that happened on an established socket.
    pub fn is_io(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SocketWriteFailed
                | ErrorKind::IncompleteSocketWrite
                | ErrorKind::SocketFlushFailed
                | ErrorKind::SocketReadFailed
        )
    }
}

/// Stable classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DialFailed,
    DialTimeout,
    ConnWaitTimeout,
    ConnConfigFailed,
    PoolClosed,
    Cancelled,
    DeadlineExceeded,
    CommandEncodingFailed,
    SocketWriteFailed,
    IncompleteSocketWrite,
    SocketFlushFailed,
    SocketReadFailed,
    MalformedResponse,
    ServerRejectedRequest,
    ClientReadonly,
    InvalidDatatype,
}

impl ErrorKind {
    /// Upper-case code, e.g. `CONN_POOL_CLOSED`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DialFailed => "CONN_DIAL_FAILED",
            ErrorKind::DialTimeout => "CONN_DIAL_TIMEOUT",
            ErrorKind::ConnWaitTimeout => "CONN_WAIT_TIMEOUT",
            ErrorKind::ConnConfigFailed => "CONN_CONFIG_FAILED",
            ErrorKind::PoolClosed => "CONN_POOL_CLOSED",
            ErrorKind::Cancelled => "REQUEST_CANCELLED",
            ErrorKind::DeadlineExceeded => "REQUEST_DEADLINE_EXCEEDED",
            ErrorKind::CommandEncodingFailed => "CMD_ENCODING_FAILED",
            ErrorKind::SocketWriteFailed => "SOCKET_WRITE_FAILED",
            ErrorKind::IncompleteSocketWrite => "INCOMPLETE_SOCKET_WRITE",
            ErrorKind::SocketFlushFailed => "SOCKET_FLUSH_FAILED",
            ErrorKind::SocketReadFailed => "SOCKET_READ_FAILED",
            ErrorKind::MalformedResponse => "MALFORMED_RESPONSE_RECEIVED",
            ErrorKind::ServerRejectedRequest => "SERVER_REJECTED_REQUEST",
            ErrorKind::ClientReadonly => "CLIENT_READONLY",
            ErrorKind::InvalidDatatype => "INVALID_DATATYPE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failures_are_malformed_responses() {
        let err = ClientError::from(DecodeError::UnsupportedType(b'?'));
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
        assert_eq!(ClientError::malformed("short").kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn kinds_have_stable_codes() {
        assert_eq!(ClientError::PoolClosed.kind().as_str(), "CONN_POOL_CLOSED");
        assert_eq!(
            ClientError::ConnWaitTimeout(Duration::from_secs(1)).kind().to_string(),
            "CONN_WAIT_TIMEOUT"
        );
    }

    #[test]
    fn socket_faults_are_io() {
        let err = ClientError::SocketReadFailed(io::Error::from(io::ErrorKind::TimedOut));
        assert!(err.is_io());
        assert!(!ClientError::PoolClosed.is_io());
    }
}
