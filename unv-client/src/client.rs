//! # Client API
//!
//! Purpose: Expose one typed async method per server command on top of the
//! pooled dispatcher.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides pooling, framing and the codec.
//! 2. **Cheap Handles**: Clones and `with_context` handles share one pool.
//! 3. **Fail Early**: Read-only violations and unsupported values are caught
//!    before a connection is taken from the pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use unv_common::{ToWire, WireValue};
use uuid::Uuid;

use crate::connection::{Connector, TcpConnector};
use crate::context::Context;
use crate::dispatch::{Command, CommandResult, Dispatcher};
use crate::error::{ClientError, ClientResult};
use crate::options::Options;
use crate::pool::{ConnectionPool, PoolStats};
use crate::result::{
    expect_bool, expect_integer, expect_text, AppendResult, BatchResult, CounterResult,
    DeleteResult, ExistsResult, ExpireResult, GetResult, MGetResult, SetResult, TextResult,
    TtlResult,
};

struct ClientInner {
    id: Uuid,
    options: Options,
    dispatcher: Dispatcher,
}

/// Async client with connection pooling.
///
/// Each call acquires a connection, runs one command and returns the
/// connection to the pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
    ctx: Context,
}

impl Client {
    /// Creates a TCP client. Options are normalized first.
    pub fn new(options: Options) -> ClientResult<Self> {
        Client::with_connector(options, Arc::new(TcpConnector))
    }

    /// Creates a client dialing through `connector`.
    pub fn with_connector(options: Options, connector: Arc<dyn Connector>) -> ClientResult<Self> {
        let options = options.normalize();
        let pool = ConnectionPool::new(options.clone(), connector)?;
        let id = Uuid::new_v4();
        info!(
            client_id = %id,
            client_name = %options.client_name,
            addr = %options.host_addr,
            pool_size = options.conn_pool_size,
            "client created"
        );
        Ok(Client {
            inner: Arc::new(ClientInner {
                id,
                options,
                dispatcher: Dispatcher::new(pool),
            }),
            ctx: Context::background(),
        })
    }

    /// Random per-instance identity.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn pool(&self) -> &ConnectionPool {
        self.inner.dispatcher.pool()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool().stats()
    }

    /// Handle sharing this client's pool whose calls run under `ctx`.
    pub fn with_context(&self, ctx: Context) -> Client {
        Client {
            inner: Arc::clone(&self.inner),
            ctx,
        }
    }

    /// Sends any command with raw arguments.
    pub async fn execute(&self, command: Command, args: &[WireValue]) -> ClientResult<CommandResult> {
        if command.is_write() {
            self.check_writable()?;
        }
        self.inner.dispatcher.send(&self.ctx, command, args).await
    }

    async fn send(&self, command: Command, args: &[WireValue]) -> ClientResult<CommandResult> {
        self.inner.dispatcher.send(&self.ctx, command, args).await
    }

    fn check_writable(&self) -> ClientResult<()> {
        if self.inner.options.is_readonly {
            return Err(ClientError::ClientReadonly);
        }
        Ok(())
    }

    /// Fetches the value stored under `key`.
    pub async fn get(&self, key: &str) -> ClientResult<GetResult> {
        let result = self.send(Command::Get, &[key.into()]).await?;
        GetResult::try_from(result)
    }

    /// Stores `value` under `key`. `ttl` of `None` keeps the record forever.
    ///
    /// Only strings, numbers, booleans and arrays can be stored.
    pub async fn set<V>(&self, key: &str, value: &V, ttl: Option<Duration>) -> ClientResult<SetResult>
    where
        V: ToWire + ?Sized,
    {
        self.check_writable()?;
        let value = value.to_wire()?;
        match value {
            WireValue::String(_)
            | WireValue::Integer(_)
            | WireValue::Float(_)
            | WireValue::Boolean(_)
            | WireValue::Array(_) => {}
            other => return Err(ClientError::InvalidDatatype(other.type_name())),
        }

        let args = [key.into(), value, WireValue::Integer(ttl.map_or(0, seconds))];
        let result = self.send(Command::Set, &args).await?;
        Ok(SetResult {
            success: expect_bool(&result)?,
            code: result.code,
        })
    }

    pub async fn exists(&self, key: &str) -> ClientResult<ExistsResult> {
        let result = self.send(Command::Exists, &[key.into()]).await?;
        Ok(ExistsResult {
            found: expect_bool(&result)?,
            code: result.code,
        })
    }

    pub async fn delete(&self, key: &str) -> ClientResult<DeleteResult> {
        self.check_writable()?;
        let result = self.send(Command::Delete, &[key.into()]).await?;
        Ok(DeleteResult {
            deleted: expect_bool(&result)?,
            code: result.code,
        })
    }

    /// Adds `offset` to the integer stored under `key`.
    pub async fn incr(&self, key: &str, offset: i64) -> ClientResult<CounterResult> {
        self.counter(Command::Incr, key, offset).await
    }

    /// Subtracts `offset` from the integer stored under `key`.
    pub async fn decr(&self, key: &str, offset: i64) -> ClientResult<CounterResult> {
        self.counter(Command::Decr, key, offset).await
    }

    async fn counter(&self, command: Command, key: &str, offset: i64) -> ClientResult<CounterResult> {
        self.check_writable()?;
        let result = self.send(command, &[key.into(), offset.into()]).await?;
        Ok(CounterResult {
            new_value: expect_integer(&result)?,
            code: result.code,
        })
    }

    pub async fn append(&self, key: &str, value: &str) -> ClientResult<AppendResult> {
        self.check_writable()?;
        let result = self.send(Command::Append, &[key.into(), value.into()]).await?;
        Ok(AppendResult {
            content_length: expect_integer(&result)?,
            code: result.code,
        })
    }

    pub async fn mget<K: AsRef<str>>(&self, keys: &[K]) -> ClientResult<MGetResult> {
        let result = self.send(Command::MGet, &[key_array(keys)]).await?;
        MGetResult::try_from(result)
    }

    pub async fn mset<V: ToWire>(&self, entries: &HashMap<String, V>) -> ClientResult<BatchResult> {
        self.check_writable()?;
        let entries = entries.to_wire()?;
        let result = self.send(Command::MSet, &[entries]).await?;
        BatchResult::try_from(result)
    }

    pub async fn mdelete<K: AsRef<str>>(&self, keys: &[K]) -> ClientResult<BatchResult> {
        self.check_writable()?;
        let result = self.send(Command::MDelete, &[key_array(keys)]).await?;
        BatchResult::try_from(result)
    }

    pub async fn ttl(&self, key: &str) -> ClientResult<TtlResult> {
        let result = self.send(Command::Ttl, &[key.into()]).await?;
        Ok(TtlResult {
            seconds: expect_integer(&result)?,
            code: result.code,
        })
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> ClientResult<ExpireResult> {
        self.check_writable()?;
        let result = self
            .send(Command::Expire, &[key.into(), seconds(ttl).into()])
            .await?;
        Ok(ExpireResult {
            success: expect_bool(&result)?,
            code: result.code,
        })
    }

    /// Asks the server to start a background snapshot.
    pub async fn snapshot(&self) -> ClientResult<TextResult> {
        expect_text(self.send(Command::Snapshot, &[]).await?)
    }

    pub async fn info(&self) -> ClientResult<TextResult> {
        expect_text(self.send(Command::Info, &[]).await?)
    }

    pub async fn help(&self) -> ClientResult<TextResult> {
        expect_text(self.send(Command::Help, &[]).await?)
    }

    pub async fn ping(&self) -> ClientResult<TextResult> {
        expect_text(self.send(Command::Ping, &[]).await?)
    }

    /// Closes the shared pool. Every handle of this client stops working.
    pub async fn close(&self) -> ClientResult<()> {
        info!(client_id = %self.inner.id, "closing client");
        self.pool().close().await
    }
}

fn seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn key_array<K: AsRef<str>>(keys: &[K]) -> WireValue {
    WireValue::Array(keys.iter().map(|key| key.as_ref().into()).collect())
}
