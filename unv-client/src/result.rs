//! Typed command results.
//!
//! Each struct narrows the `value` slot of a [`CommandResult`] and keeps the
//! server status code next to it.

use std::collections::HashMap;
use std::time::Duration;

use unv_common::WireValue;

use crate::dispatch::CommandResult;
use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq)]
pub struct GetResult {
    /// Stored value, `Null` when the record was not found.
    pub value: WireValue,
    pub code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetResult {
    pub success: bool,
    pub code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistsResult {
    pub found: bool,
    pub code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted: bool,
    pub code: i64,
}

/// Result of `INCR` and `DECR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterResult {
    pub new_value: i64,
    pub code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// Length of the value after appending.
    pub content_length: i64,
    pub code: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MGetResult {
    pub values: HashMap<String, WireValue>,
    pub code: i64,
}

/// Per-key outcome of `MSET` or `MDELETE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub outcomes: HashMap<String, bool>,
    pub code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpireResult {
    pub success: bool,
    pub code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlResult {
    /// Raw seconds as reported. Negative values mean no expiry or no record.
    pub seconds: i64,
    pub code: i64,
}

impl TtlResult {
    /// Remaining time to live, `None` when the server reports a negative value.
    pub fn remaining(&self) -> Option<Duration> {
        u64::try_from(self.seconds).ok().map(Duration::from_secs)
    }
}

/// Text reply of `PING`, `INFO`, `HELP` and `SNAPSHOT`.
///
/// A `Null` or `true` value carries no text, so the reply message is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextResult {
    pub text: String,
    pub code: i64,
}

fn mismatch(expected: &str, found: &WireValue) -> ClientError {
    ClientError::malformed(format!(
        "expected {expected} value, got {}",
        found.type_name()
    ))
}

impl TryFrom<CommandResult> for GetResult {
    type Error = ClientError;

    fn try_from(result: CommandResult) -> ClientResult<Self> {
        match result.value {
            WireValue::Map(mut record) => Ok(GetResult {
                value: record.remove("Value").unwrap_or(WireValue::Null),
                code: result.code,
            }),
            // Misses come back without a record.
            WireValue::Null => Ok(GetResult {
                value: WireValue::Null,
                code: result.code,
            }),
            other => Err(mismatch("record map", &other)),
        }
    }
}

pub(crate) fn expect_bool(result: &CommandResult) -> ClientResult<bool> {
    result
        .value
        .as_bool()
        .ok_or_else(|| mismatch("boolean", &result.value))
}

pub(crate) fn expect_integer(result: &CommandResult) -> ClientResult<i64> {
    result
        .value
        .as_i64()
        .ok_or_else(|| mismatch("integer", &result.value))
}

pub(crate) fn expect_text(result: CommandResult) -> ClientResult<TextResult> {
    match result.value {
        WireValue::String(text) => Ok(TextResult {
            text,
            code: result.code,
        }),
        // Acknowledgements without a payload carry their text in the message.
        WireValue::Null | WireValue::Boolean(true) => Ok(TextResult {
            text: result.message,
            code: result.code,
        }),
        other => Err(mismatch("string", &other)),
    }
}

impl TryFrom<CommandResult> for MGetResult {
    type Error = ClientError;

    fn try_from(result: CommandResult) -> ClientResult<Self> {
        match result.value {
            WireValue::Map(values) => Ok(MGetResult {
                values,
                code: result.code,
            }),
            other => Err(mismatch("map", &other)),
        }
    }
}

impl TryFrom<CommandResult> for BatchResult {
    type Error = ClientError;

    fn try_from(result: CommandResult) -> ClientResult<Self> {
        let entries = match result.value {
            WireValue::Map(entries) => entries,
            other => return Err(mismatch("map", &other)),
        };
        let outcomes = entries
            .into_iter()
            .map(|(key, value)| match value {
                WireValue::Boolean(flag) => Ok((key, flag)),
                other => Err(ClientError::malformed(format!(
                    "outcome for key {key:?} is {}, not boolean",
                    other.type_name()
                ))),
            })
            .collect::<ClientResult<HashMap<_, _>>>()?;
        Ok(BatchResult {
            outcomes,
            code: result.code,
        })
    }
}
