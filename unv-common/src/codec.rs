//! # Wire Encoding and Parsing
//!
//! Purpose: Encode `WireValue`s into the store's line-oriented wire format and
//! parse exactly one value back out of a byte stream.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Values are parsed top-down; nested containers
//!    recurse with an explicit depth bound.
//! 2. **Buffer Reuse**: One line buffer is threaded through the whole parse.
//! 3. **Binary-Safe Lengths**: Bulk payloads are read by declared length, never
//!    pre-allocated from untrusted input.
//! 4. **Fail Fast**: Unknown type bytes and broken framing stop the parse.
//!
//! ## Wire Forms
//!
//! ```text
//! String   $<len>\r\n<bytes>\r\n      Integer  :<decimal>\r\n
//! Float    ,<decimal>\r\n             Boolean  #t\r\n | #f\r\n
//! Null     _\r\n                      Error    -<message>\r\n
//! Array    *<n>\r\n<n values>         Map      %<2n>\r\n<n key/value pairs>
//! ```

use std::io::{BufRead, Cursor, Read};

use crate::error::{DecodeError, EncodeError};
use crate::value::WireValue;

/// Deepest container nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 128;

/// Upper bound on container capacity reserved ahead of parsing its items.
const PREALLOC_LIMIT: usize = 1024;

/// Encodes one value into a fresh buffer.
pub fn encode(value: &WireValue) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(64);
    encode_into(value, &mut out)?;
    Ok(out)
}

/// Encodes one value, appending to `out`.
///
/// On error `out` may hold a partial encoding and should be discarded.
pub fn encode_into(value: &WireValue, out: &mut Vec<u8>) -> Result<(), EncodeError> {
    match value {
        WireValue::String(text) => push_bulk(out, text.as_bytes()),
        WireValue::Integer(number) => {
            out.push(b':');
            out.extend_from_slice(number.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        WireValue::Float(number) => {
            // `Display` for f64 is the shortest string that parses back exactly.
            out.push(b',');
            out.extend_from_slice(number.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        WireValue::Boolean(true) => out.extend_from_slice(b"#t\r\n"),
        WireValue::Boolean(false) => out.extend_from_slice(b"#f\r\n"),
        WireValue::Null => out.extend_from_slice(b"_\r\n"),
        WireValue::Error(message) => {
            if message.contains(['\r', '\n']) {
                return Err(EncodeError::InvalidErrorMessage(message.clone()));
            }
            out.push(b'-');
            out.extend_from_slice(message.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        WireValue::Array(items) => {
            push_header(out, b'*', items.len());
            for item in items {
                encode_into(item, out)?;
            }
        }
        WireValue::Map(map) => {
            push_header(out, b'%', map.len() * 2);
            for (key, item) in map {
                push_bulk(out, key.as_bytes());
                encode_into(item, out)?;
            }
        }
    }
    Ok(())
}

/// Encodes a request frame: an array of the command name followed by its arguments.
pub fn encode_command(
    command: &str,
    args: &[WireValue],
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    push_header(out, b'*', args.len() + 1);
    push_bulk(out, command.as_bytes());
    for arg in args {
        encode_into(arg, out)?;
    }
    Ok(())
}

/// Reads one value from the buffered reader, consuming exactly its bytes.
pub fn decode<R: BufRead>(reader: &mut R) -> Result<WireValue, DecodeError> {
    let mut line_buf = Vec::with_capacity(64);
    decode_value(reader, &mut line_buf, 0)
}

/// Decodes `bytes` as exactly one value. Leftover bytes are an error.
pub fn decode_slice(bytes: &[u8]) -> Result<WireValue, DecodeError> {
    let (value, used) = decode_prefix(bytes)?;
    if used != bytes.len() {
        return Err(DecodeError::TrailingBytes(bytes.len() - used));
    }
    Ok(value)
}

/// Decodes one value from the start of `bytes` and reports how many bytes it used.
pub fn decode_prefix(bytes: &[u8]) -> Result<(WireValue, usize), DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let value = decode(&mut cursor)?;
    Ok((value, cursor.position() as usize))
}

fn decode_value<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    depth: usize,
) -> Result<WireValue, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep(MAX_DEPTH));
    }

    match read_byte(reader)? {
        b'+' => {
            read_line(reader, line_buf)?;
            Ok(WireValue::String(utf8(line_buf)?))
        }
        b'-' => {
            read_line(reader, line_buf)?;
            Ok(WireValue::Error(utf8(line_buf)?))
        }
        b':' => {
            read_line(reader, line_buf)?;
            Ok(WireValue::Integer(parse_i64(line_buf)?))
        }
        b',' => {
            read_line(reader, line_buf)?;
            Ok(WireValue::Float(parse_f64(line_buf)?))
        }
        b'$' => match read_length(reader, line_buf)? {
            Some(len) => parse_bulk_len(reader, len),
            None => Ok(WireValue::Null),
        },
        b'*' => match read_length(reader, line_buf)? {
            Some(len) => parse_array_len(reader, len, line_buf, depth),
            None => Ok(WireValue::Null),
        },
        b'%' => {
            let len = read_length(reader, line_buf)?
                .ok_or_else(|| DecodeError::InvalidLength("-1".to_string()))?;
            parse_map_len(reader, len, line_buf, depth)
        }
        b'#' => {
            let value = match read_byte(reader)? {
                b't' => true,
                b'f' => false,
                other => return Err(DecodeError::InvalidBoolean(other)),
            };
            expect_crlf(reader)?;
            Ok(WireValue::Boolean(value))
        }
        b'_' => {
            expect_crlf(reader)?;
            Ok(WireValue::Null)
        }
        other => Err(DecodeError::UnsupportedType(other)),
    }
}

fn parse_bulk_len<R: BufRead>(reader: &mut R, len: usize) -> Result<WireValue, DecodeError> {
    let mut data = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() < len {
        return Err(DecodeError::UnexpectedEof);
    }
    expect_crlf(reader)?;

    String::from_utf8(data)
        .map(WireValue::String)
        .map_err(|_| DecodeError::InvalidUtf8)
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: usize,
    line_buf: &mut Vec<u8>,
    depth: usize,
) -> Result<WireValue, DecodeError> {
    let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    for _ in 0..len {
        items.push(decode_value(reader, line_buf, depth + 1)?);
    }
    Ok(WireValue::Array(items))
}

fn parse_map_len<R: BufRead>(
    reader: &mut R,
    len: usize,
    line_buf: &mut Vec<u8>,
    depth: usize,
) -> Result<WireValue, DecodeError> {
    // The header counts keys and values separately.
    if len % 2 != 0 {
        return Err(DecodeError::InvalidLength(len.to_string()));
    }

    let pairs = len / 2;
    let mut map = std::collections::HashMap::with_capacity(pairs.min(PREALLOC_LIMIT));
    for _ in 0..pairs {
        let key = match decode_value(reader, line_buf, depth + 1)? {
            WireValue::String(key) => key,
            other => return Err(DecodeError::NonStringKey(other.type_name())),
        };
        let value = decode_value(reader, line_buf, depth + 1)?;
        map.insert(key, value);
    }
    Ok(WireValue::Map(map))
}

fn read_byte<R: BufRead>(reader: &mut R) -> Result<u8, DecodeError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn expect_crlf<R: BufRead>(reader: &mut R) -> Result<(), DecodeError> {
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(DecodeError::MissingTerminator);
    }
    Ok(())
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), DecodeError> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 || buf.last() != Some(&b'\n') {
        return Err(DecodeError::UnexpectedEof);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(DecodeError::MissingTerminator);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

/// Reads a length line. `-1` is the protocol-level null and maps to `None`.
fn read_length<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
) -> Result<Option<usize>, DecodeError> {
    read_line(reader, line_buf)?;
    let parsed = std::str::from_utf8(line_buf)
        .ok()
        .and_then(|text| text.parse::<i64>().ok());

    match parsed {
        Some(-1) => Ok(None),
        Some(len) if len >= 0 => usize::try_from(len)
            .map(Some)
            .map_err(|_| invalid_length(line_buf)),
        _ => Err(invalid_length(line_buf)),
    }
}

fn invalid_length(data: &[u8]) -> DecodeError {
    DecodeError::InvalidLength(String::from_utf8_lossy(data).into_owned())
}

fn parse_i64(data: &[u8]) -> Result<i64, DecodeError> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| DecodeError::InvalidInteger(String::from_utf8_lossy(data).into_owned()))
}

fn parse_f64(data: &[u8]) -> Result<f64, DecodeError> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| DecodeError::InvalidFloat(String::from_utf8_lossy(data).into_owned()))
}

fn utf8(data: &[u8]) -> Result<String, DecodeError> {
    std::str::from_utf8(data)
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8)
}

fn push_header(out: &mut Vec<u8>, tag: u8, len: usize) {
    out.push(tag);
    push_usize(out, len);
    out.extend_from_slice(b"\r\n");
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    push_header(out, b'$', data.len());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Digits go through a stack buffer so headers never allocate.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}
