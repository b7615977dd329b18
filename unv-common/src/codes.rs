//! # Server Status Codes
//!
//! Numeric status codes carried in the second slot of every reply
//! (`[value, code, message]`).

/// PING answered.
pub const PING_SUCCESS: i64 = 200;
/// Background snapshot accepted.
pub const SNAPSHOT_STARTED: i64 = 201;

pub const SERVER_SHUTTING_DOWN: i64 = 501;
pub const SERVER_BUSY: i64 = 502;

pub const RECORD_FOUND: i64 = 1000;
pub const RECORD_UPDATED: i64 = 1001;
pub const RECORD_DELETED: i64 = 1002;
pub const HELP_CONTENT_OK: i64 = 1010;
pub const INFO_CONTENT_OK: i64 = 1011;

pub const MGET_COMPLETED: i64 = 1100;
pub const MSET_COMPLETED: i64 = 1101;
pub const MDEL_COMPLETED: i64 = 1102;

pub const INVALID_CMD_INPUT: i64 = 5000;
pub const RECORD_NOT_FOUND: i64 = 5001;
pub const RECORD_EXPIRED: i64 = 5002;
pub const RECORD_NOT_DELETED: i64 = 5003;
pub const INCR_INVALID_TYPE: i64 = 5004;
pub const RECORD_TOO_BIG: i64 = 5005;
pub const INVALID_DATATYPE: i64 = 5006;

/// Returns true for codes reporting a server-side failure.
pub fn is_failure(code: i64) -> bool {
    code >= INVALID_CMD_INPUT || code == SERVER_SHUTTING_DOWN || code == SERVER_BUSY
}
