//! Codec error types.

use std::io;

use thiserror::Error;

/// Failure to turn an application value into wire bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Integer cannot be represented as a signed 64-bit wire integer.
    #[error("unsupported value: {ty} {value} does not fit a 64-bit signed integer")]
    IntegerOutOfRange { ty: &'static str, value: String },

    /// Error messages are line-terminated and cannot carry CR or LF.
    #[error("error message contains a line terminator: {0:?}")]
    InvalidErrorMessage(String),
}

/// Failure to read one value from wire bytes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Leading byte does not name a known type. Decoding stops here.
    #[error("unsupported type byte 0x{0:02x}")]
    UnsupportedType(u8),

    #[error("input ended before the value was complete")]
    UnexpectedEof,

    #[error("line is not terminated by CRLF")]
    MissingTerminator,

    #[error("invalid length {0:?}")]
    InvalidLength(String),

    #[error("invalid integer {0:?}")]
    InvalidInteger(String),

    #[error("invalid float {0:?}")]
    InvalidFloat(String),

    #[error("invalid boolean byte 0x{0:02x}")]
    InvalidBoolean(u8),

    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("map key must be a string, found {0}")]
    NonStringKey(&'static str),

    #[error("value nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("{0} bytes left after the value")]
    TrailingBytes(usize),

    #[error("io error while decoding: {0}")]
    Io(io::Error),
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::UnexpectedEof
        } else {
            DecodeError::Io(err)
        }
    }
}
