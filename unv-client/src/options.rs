//! # Client Options
//!
//! Purpose: Carry the settings consumed by the pool, connections and
//! dispatcher, with defaults and upper bounds applied in one place.
//!
//! ## Usage Notes
//! - `Options::default()` is already normalized.
//! - Deserialized or hand-built options should go through `normalize()`;
//!   `Client::new` does this for you.
//! - Optional timeouts use `None` for "no timeout". A zero duration is read
//!   the same way.
//! - Durations are (de)serialized as integer milliseconds (`*_ms` keys).

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST_ADDR: &str = "localhost:11191";
pub const DEFAULT_CLIENT_NAME: &str = "unv-client";
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);
pub const DEFAULT_CONN_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONN_POOL_SIZE: usize = 10;
pub const DEFAULT_CONN_MAX_LIFETIME: Duration = Duration::from_secs(10 * 60);

pub const MAX_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_RETRIES: u32 = 1 << 4;
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_millis(500);
pub const MAX_CONN_POOL_SIZE: usize = 1 << 16;
pub const MAX_CONN_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Settings for one client and its connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Server address, e.g. "127.0.0.1:11191".
    pub host_addr: String,
    pub client_name: String,
    /// Budget shared by all dial attempts of one connection.
    #[serde(rename = "dial_timeout_ms", with = "millis::option")]
    pub dial_timeout: Option<Duration>,
    #[serde(rename = "read_timeout_ms", with = "millis::option")]
    pub read_timeout: Option<Duration>,
    #[serde(rename = "write_timeout_ms", with = "millis::option")]
    pub write_timeout: Option<Duration>,
    /// Extra dial attempts after the first one fails.
    pub max_retries: u32,
    /// Pause between dial attempts.
    #[serde(rename = "retry_backoff_ms", with = "millis")]
    pub retry_backoff: Duration,
    /// How long `acquire` waits for an admission slot.
    #[serde(rename = "conn_wait_timeout_ms", with = "millis")]
    pub conn_wait_timeout: Duration,
    /// Sockets kept open by the pool. Admission allows twice as many in flight.
    pub conn_pool_size: usize,
    /// Age after which an idle connection is no longer reused.
    #[serde(rename = "conn_max_lifetime_ms", with = "millis::option")]
    pub conn_max_lifetime: Option<Duration>,
    /// Reject write commands before they reach the server.
    pub is_readonly: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            host_addr: DEFAULT_HOST_ADDR.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            dial_timeout: Some(DEFAULT_DIAL_TIMEOUT),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            conn_wait_timeout: DEFAULT_CONN_WAIT_TIMEOUT,
            conn_pool_size: DEFAULT_CONN_POOL_SIZE,
            conn_max_lifetime: Some(DEFAULT_CONN_MAX_LIFETIME),
            is_readonly: false,
        }
    }
}

impl Options {
    /// Creates default options pointing at `host_addr`.
    pub fn new(host_addr: impl Into<String>) -> Self {
        Options {
            host_addr: host_addr.into(),
            ..Options::default()
        }
    }

    /// Fills empty fields with defaults and clamps values to their maxima.
    pub fn normalize(mut self) -> Self {
        if self.host_addr.is_empty() {
            self.host_addr = DEFAULT_HOST_ADDR.to_string();
        }
        if self.client_name.is_empty() {
            self.client_name = DEFAULT_CLIENT_NAME.to_string();
        }

        self.dial_timeout = clamp_optional(self.dial_timeout, MAX_DIAL_TIMEOUT);
        self.read_timeout = clamp_optional(self.read_timeout, MAX_READ_TIMEOUT);
        self.write_timeout = clamp_optional(self.write_timeout, MAX_WRITE_TIMEOUT);
        self.conn_max_lifetime = clamp_optional(self.conn_max_lifetime, MAX_CONN_MAX_LIFETIME);

        self.max_retries = self.max_retries.min(MAX_RETRIES);
        self.retry_backoff = self.retry_backoff.min(MAX_RETRY_BACKOFF);

        if self.conn_wait_timeout.is_zero() {
            self.conn_wait_timeout = DEFAULT_CONN_WAIT_TIMEOUT;
        }
        if self.conn_pool_size == 0 {
            self.conn_pool_size = DEFAULT_CONN_POOL_SIZE;
        }
        self.conn_pool_size = self.conn_pool_size.min(MAX_CONN_POOL_SIZE);
        self
    }

    /// Capacity of the admission queue: twice the pool size.
    pub fn admission_capacity(&self) -> usize {
        self.conn_pool_size.saturating_mul(2)
    }
}

fn clamp_optional(value: Option<Duration>, max: Duration) -> Option<Duration> {
    value.filter(|d| !d.is_zero()).map(|d| d.min(max))
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
        }
    }
}
