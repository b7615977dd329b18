//! # Universum Async Client
//!
//! Purpose: Talk to a Universum key-value server over persistent TCP
//! connections, with a bounded pool, liveness-checked reuse and a framed
//! request/response protocol.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse sockets and bound concurrent requests.
//! 2. **Layered Core**: `Client` -> `Dispatcher` -> `ConnectionPool` ->
//!    `Connection`, each testable against in-memory transports.
//! 3. **Typed Failures**: Every error carries a stable `ErrorKind`.
//! 4. **Caller-Owned Deadlines**: A `Context` bounds waiting and socket I/O.
//!
//! ## Example
//! ```no_run
//! use unv_client::{Client, Options};
//!
//! # async fn run() -> Result<(), unv_client::ClientError> {
//! let client = Client::new(Options::new("127.0.0.1:11191"))?;
//! client.set("greeting", "hello", None).await?;
//! let record = client.get("greeting").await?;
//! println!("{:?}", record.value);
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
mod context;
mod dispatch;
mod error;
mod options;
mod pool;
mod result;

#[cfg(test)]
mod test_support;

pub use client::Client;
pub use connection::{
    compose_deadline, ConnId, Connection, Connector, Liveness, Probe, TcpConnector, Transport,
};
pub use context::Context;
pub use dispatch::{Command, CommandResult, Dispatcher, RESPONSE_DELIMITER};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use options::Options;
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use result::{
    AppendResult, BatchResult, CounterResult, DeleteResult, ExistsResult, ExpireResult,
    GetResult, MGetResult, SetResult, TextResult, TtlResult,
};
pub use tokio_util::sync::CancellationToken;
pub use unv_common::{codes, ToWire, WireValue};
