//! RESP2 encoding and incremental decoding.
//!
//! Commands are sent as arrays of bulk strings. Replies are decoded from a
//! growing buffer: [`RespParser::next_value`] returns `Ok(None)` until a whole
//! value has arrived, so partial TCP reads can be fed in as they come.

use crate::error::{ConnectionError, Result};
use bytes::{BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// A decoded RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<String>),
    Array(Option<Vec<Value>>),
}

impl Value {
    /// Textual content of scalar values. Nil bulk strings map to `""`.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Simple(s) => Some(s.clone()),
            Value::Bulk(Some(s)) => Some(s.clone()),
            Value::Bulk(None) => Some(String::new()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Error(_) | Value::Array(_) => None,
        }
    }
}

/// Encode a command and its arguments as a RESP array of bulk strings.
pub fn encode_command(command: &str, args: &[String]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(format!("*{}\r\n", args.len() + 1).as_bytes());
    put_bulk(&mut buf, command);
    for arg in args {
        put_bulk(&mut buf, arg);
    }
    buf.freeze()
}

fn put_bulk(buf: &mut BytesMut, value: &str) {
    buf.put_slice(format!("${}\r\n", value.len()).as_bytes());
    buf.put_slice(value.as_bytes());
    buf.put_slice(CRLF);
}

/// Largest bulk string accepted from a peer.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Largest array accepted from a peer.
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;
/// Deepest array nesting accepted from a peer.
pub const MAX_DEPTH: usize = 32;
/// Longest header or simple-string line accepted from a peer.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Incremental RESP2 decoder.
#[derive(Debug, Default)]
pub struct RespParser {
    buffer: BytesMut,
    /// Buffer length below which the pending value cannot be complete.
    needed: usize,
}

impl RespParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed by a complete value.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_value(&mut self) -> Result<Option<Value>> {
        if self.buffer.len() < self.needed {
            return Ok(None);
        }
        match scan(&self.buffer, 0, 0)? {
            Scan::Partial(needed) => {
                self.needed = needed;
                Ok(None)
            }
            Scan::Complete(end) => {
                self.needed = 0;
                let frame = self.buffer.split_to(end);
                let (value, _) = decode(&frame, 0)?;
                Ok(Some(value))
            }
        }
    }
}

enum Scan {
    /// A whole value ends at this offset.
    Complete(usize),
    /// At least this many bytes must be buffered before retrying.
    Partial(usize),
}

fn protocol(message: impl Into<String>) -> ConnectionError {
    ConnectionError::Protocol(message.into())
}

fn read_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(pos..)?;
    let end = rest.windows(2).position(|w| w == CRLF)?;
    Some((&rest[..end], pos + end + 2))
}

fn line_to_string(line: &[u8]) -> Result<String> {
    String::from_utf8(line.to_vec()).map_err(|e| protocol(format!("invalid UTF-8: {}", e)))
}

fn parse_int(line: &[u8]) -> Result<i64> {
    let text = line_to_string(line)?;
    text.parse::<i64>()
        .map_err(|_| protocol(format!("invalid integer '{}'", text)))
}

fn bounded_len(len: i64, max: usize, what: &str) -> Result<usize> {
    match usize::try_from(len) {
        Ok(len) if len <= max => Ok(len),
        _ => Err(protocol(format!("{} length {} exceeds limit {}", what, len, max))),
    }
}

/// Find where the value at `pos` ends without allocating, enforcing the
/// size and depth limits.
fn scan(buf: &[u8], pos: usize, depth: usize) -> Result<Scan> {
    if depth > MAX_DEPTH {
        return Err(protocol(format!("arrays nested deeper than {}", MAX_DEPTH)));
    }
    let Some(&marker) = buf.get(pos) else {
        return Ok(Scan::Partial(pos + 1));
    };
    if !matches!(marker, b'+' | b'-' | b':' | b'$' | b'*' | b'>') {
        return Err(protocol(format!("unexpected RESP type byte 0x{:02x}", marker)));
    }
    let Some((line, next)) = read_line(buf, pos + 1) else {
        if buf.len() - pos > MAX_LINE_LEN {
            return Err(protocol(format!("line longer than {} bytes", MAX_LINE_LEN)));
        }
        return Ok(Scan::Partial(buf.len() + 1));
    };

    match marker {
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok(Scan::Complete(next));
            }
            let end = next + bounded_len(len, MAX_BULK_LEN, "bulk string")? + 2;
            if buf.len() < end {
                return Ok(Scan::Partial(end));
            }
            if &buf[end - 2..end] != CRLF {
                return Err(protocol("bulk string not terminated by CRLF"));
            }
            Ok(Scan::Complete(end))
        }
        // '>' is the RESP3 push marker; its body has array layout.
        b'*' | b'>' => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok(Scan::Complete(next));
            }
            let mut cursor = next;
            for _ in 0..bounded_len(count, MAX_ARRAY_LEN, "array")? {
                match scan(buf, cursor, depth + 1)? {
                    Scan::Complete(after) => cursor = after,
                    partial => return Ok(partial),
                }
            }
            Ok(Scan::Complete(cursor))
        }
        _ => Ok(Scan::Complete(next)),
    }
}

/// Decode a value that [`scan`] has already found complete and within limits.
fn decode(buf: &[u8], pos: usize) -> Result<(Value, usize)> {
    let truncated = || protocol("truncated RESP value");
    let marker = *buf.get(pos).ok_or_else(truncated)?;
    let (line, next) = read_line(buf, pos + 1).ok_or_else(truncated)?;

    match marker {
        b'+' => Ok((Value::Simple(line_to_string(line)?), next)),
        b'-' => Ok((Value::Error(line_to_string(line)?), next)),
        b':' => Ok((Value::Integer(parse_int(line)?), next)),
        b'$' => {
            let len = parse_int(line)?;
            if len < 0 {
                return Ok((Value::Bulk(None), next));
            }
            let end = next + bounded_len(len, MAX_BULK_LEN, "bulk string")?;
            let body = buf.get(next..end).ok_or_else(truncated)?;
            Ok((Value::Bulk(Some(line_to_string(body)?)), end + 2))
        }
        b'*' | b'>' => {
            let count = parse_int(line)?;
            if count < 0 {
                return Ok((Value::Array(None), next));
            }
            let mut items = Vec::new();
            let mut cursor = next;
            for _ in 0..bounded_len(count, MAX_ARRAY_LEN, "array")? {
                let (item, after) = decode(buf, cursor)?;
                items.push(item);
                cursor = after;
            }
            Ok((Value::Array(Some(items)), cursor))
        }
        other => Err(protocol(format!("unexpected RESP type byte 0x{:02x}", other))),
    }
}
