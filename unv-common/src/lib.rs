// unv-common - Wire value model and codec for the Universum client
//
// This crate defines the value model, its wire encoding, and the server's
// status codes. It performs no I/O.

pub mod codec;
pub mod codes;
pub mod error;
pub mod value;

// Re-export for convenience
pub use codec::{decode, decode_prefix, decode_slice, encode, encode_command, encode_into};
pub use error::{DecodeError, EncodeError};
pub use value::{ToWire, WireValue};
