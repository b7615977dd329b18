//! # Command Dispatch
//!
//! Purpose: Run one request/response cycle over a pooled connection and turn
//! every failure into a `ClientError`.
//!
//! ## Design Principles
//! 1. **Single Round Trip**: One command, one frame back, one release.
//! 2. **Pessimistic Health**: A connection is marked unhealthy before the
//!    first byte is written and only cleared once a whole frame was read.
//! 3. **Framing Outside the Codec**: Responses end with a fixed delimiter, so
//!    the reader never needs to parse while receiving.

use std::fmt;
use std::io;

use bytes::BytesMut;
use tracing::{debug, trace, warn};
use unv_common::{decode_slice, encode_command, WireValue};

use crate::connection::Connection;
use crate::context::Context;
use crate::error::{ClientError, ClientResult};
use crate::options::Options;
use crate::pool::ConnectionPool;

/// Trailer the server appends to every response frame.
pub const RESPONSE_DELIMITER: &[u8; 4] = b"\x04\x04\x04\x04";

const READ_CHUNK: usize = 1024;

/// Commands understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Ping,
    Exists,
    Get,
    Set,
    Delete,
    Incr,
    Decr,
    Append,
    MGet,
    MSet,
    MDelete,
    Ttl,
    Expire,
    Snapshot,
    Info,
    Help,
}

impl Command {
    pub const ALL: [Command; 16] = [
        Command::Ping,
        Command::Exists,
        Command::Get,
        Command::Set,
        Command::Delete,
        Command::Incr,
        Command::Decr,
        Command::Append,
        Command::MGet,
        Command::MSet,
        Command::MDelete,
        Command::Ttl,
        Command::Expire,
        Command::Snapshot,
        Command::Info,
        Command::Help,
    ];

    /// Name sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::Exists => "EXISTS",
            Command::Get => "GET",
            Command::Set => "SET",
            Command::Delete => "DELETE",
            Command::Incr => "INCR",
            Command::Decr => "DECR",
            Command::Append => "APPEND",
            Command::MGet => "MGET",
            Command::MSet => "MSET",
            Command::MDelete => "MDELETE",
            Command::Ttl => "TTL",
            Command::Expire => "EXPIRE",
            Command::Snapshot => "SNAPSHOT",
            Command::Info => "INFO",
            Command::Help => "HELP",
        }
    }

    /// True for commands that modify stored data.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Command::Set
                | Command::Delete
                | Command::Incr
                | Command::Decr
                | Command::Append
                | Command::MSet
                | Command::MDelete
                | Command::Expire
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded `[value, code, message]` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub value: WireValue,
    /// Status code, see `unv_common::codes`.
    pub code: i64,
    pub message: String,
}

impl TryFrom<WireValue> for CommandResult {
    type Error = ClientError;

    fn try_from(value: WireValue) -> ClientResult<Self> {
        let items = match value {
            WireValue::Error(message) => return Err(ClientError::ServerRejectedRequest { message }),
            WireValue::Array(items) => items,
            other => {
                return Err(ClientError::malformed(format!(
                    "expected a reply array, got {}",
                    other.type_name()
                )))
            }
        };
        let len = items.len();
        match <[WireValue; 3]>::try_from(items) {
            Ok([value, WireValue::Integer(code), WireValue::String(message)]) => Ok(CommandResult {
                value,
                code,
                message,
            }),
            Ok(_) => Err(ClientError::malformed(
                "reply must carry an integer code and a string message",
            )),
            Err(_) => Err(ClientError::malformed(format!(
                "expected 3 reply elements, got {len}"
            ))),
        }
    }
}

/// Sends commands over a shared pool.
#[derive(Clone)]
pub struct Dispatcher {
    pool: ConnectionPool,
}

impl Dispatcher {
    pub fn new(pool: ConnectionPool) -> Self {
        Dispatcher { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Sends `command` with `args` and waits for the reply.
    ///
    /// The connection goes back to the pool on every path. If the call is
    /// cancelled or fails mid-exchange it is discarded instead of reused.
    pub async fn send(
        &self,
        ctx: &Context,
        command: Command,
        args: &[WireValue],
    ) -> ClientResult<CommandResult> {
        let mut conn = self.pool.acquire(ctx).await?;
        let conn_id = conn.id();
        let options = self.pool.options();

        let outcome = ctx.run(exchange(&mut conn, ctx, options, command, args)).await;

        if let Err(err) = self.pool.release(conn) {
            warn!(conn_id, error = %err, "failed to release connection");
        }

        let frame = outcome.map_err(|err| {
            debug!(%command, conn_id, error = %err, "command failed");
            err
        })?;
        let result = CommandResult::try_from(decode_slice(&frame)?)?;
        trace!(%command, conn_id, code = result.code, "command completed");
        Ok(result)
    }
}

async fn exchange(
    conn: &mut Connection,
    ctx: &Context,
    options: &Options,
    command: Command,
    args: &[WireValue],
) -> ClientResult<BytesMut> {
    let mut request = Vec::with_capacity(64);
    encode_command(command.as_str(), args, &mut request)?;

    // Cleared only after a complete frame was read.
    conn.set_healthy(false);

    let deadline = conn.deadline(ctx.deadline(), options.write_timeout);
    let written = conn
        .write(&request, deadline)
        .await
        .map_err(ClientError::SocketWriteFailed)?;
    if written != request.len() {
        return Err(ClientError::IncompleteSocketWrite {
            written,
            expected: request.len(),
        });
    }
    conn.flush(deadline)
        .await
        .map_err(ClientError::SocketFlushFailed)?;

    let deadline = conn.deadline(ctx.deadline(), options.read_timeout);
    let frame = read_frame(conn, deadline).await?;
    conn.set_healthy(true);
    Ok(frame)
}

/// Reads until the buffer ends with the delimiter and strips it.
async fn read_frame(
    conn: &mut Connection,
    deadline: Option<tokio::time::Instant>,
) -> ClientResult<BytesMut> {
    let mut frame = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = conn
            .read(&mut chunk, deadline)
            .await
            .map_err(ClientError::SocketReadFailed)?;
        if n == 0 {
            let reason = if frame.is_empty() {
                "connection closed before the response"
            } else {
                "connection closed mid-response"
            };
            return Err(ClientError::SocketReadFailed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                reason,
            )));
        }
        frame.extend_from_slice(&chunk[..n]);
        if frame.ends_with(RESPONSE_DELIMITER) {
            frame.truncate(frame.len() - RESPONSE_DELIMITER.len());
            return Ok(frame);
        }
    }
}
