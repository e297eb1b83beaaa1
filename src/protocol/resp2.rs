//! RESP2 protocol parser and encoder.
//!
//! Supported frames:
//! - Simple Strings (+)
//! - Errors (-)
//! - Integers (:)
//! - Bulk Strings ($)
//! - Arrays (*)
//! - Null (represented as $-1 or *-1)
//! - Inline commands (`PING\r\n`), parsed as an array of bulk strings

use super::{ParseResult, RespError, RespType, RespValue, MAX_BULK_SIZE, MAX_ELEMENTS, MAX_NESTING_DEPTH};
use bytes::Bytes;

/// RESP2 parser.
#[derive(Debug, Default)]
pub struct Resp2Parser {
    /// Current nesting depth.
    depth: usize,
}

impl Resp2Parser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one value from the front of `data`.
    ///
    /// On success the result carries the number of bytes the value spans, so
    /// the caller can advance past it and parse the next pipelined frame.
    pub fn parse(&mut self, data: &[u8]) -> ParseResult {
        self.depth = 0;
        match self.parse_value(data) {
            Step::Done(value, consumed) => ParseResult::Ok { value, consumed },
            Step::Incomplete => ParseResult::Incomplete,
            Step::Error(e) => ParseResult::Error(e),
        }
    }

    fn parse_value(&mut self, data: &[u8]) -> Step {
        if data.is_empty() {
            return Step::Incomplete;
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Step::Error("maximum nesting depth exceeded".to_string());
        }

        match RespType::from_byte(data[0]) {
            Some(RespType::SimpleString) => self.parse_simple_string(&data[1..]),
            Some(RespType::Error) => self.parse_error(&data[1..]),
            Some(RespType::Integer) => self.parse_integer(&data[1..]),
            Some(RespType::BulkString) => self.parse_bulk_string(&data[1..]),
            Some(RespType::Array) => self.parse_array(&data[1..]),
            None if self.depth == 0 => self.parse_inline(data),
            None => Step::Error(format!("unexpected type byte 0x{:02x}", data[0])),
        }
    }

    /// Parse a simple string (+OK\r\n).
    fn parse_simple_string(&self, data: &[u8]) -> Step {
        match find_crlf(data) {
            Some(pos) => {
                let s = String::from_utf8_lossy(&data[..pos]).to_string();
                // +1 for prefix, +2 for CRLF
                Step::Done(RespValue::SimpleString(s), pos + 3)
            }
            None => Step::Incomplete,
        }
    }

    /// Parse an error (-ERR message\r\n).
    fn parse_error(&self, data: &[u8]) -> Step {
        match find_crlf(data) {
            Some(pos) => {
                let s = String::from_utf8_lossy(&data[..pos]).to_string();
                let (kind, message) = parse_error_string(&s);
                Step::Done(RespValue::Error(RespError { kind, message }), pos + 3)
            }
            None => Step::Incomplete,
        }
    }

    /// Parse an integer (:1000\r\n).
    fn parse_integer(&self, data: &[u8]) -> Step {
        match find_crlf(data) {
            Some(pos) => match parse_decimal(&data[..pos]) {
                Some(n) => Step::Done(RespValue::Integer(n), pos + 3),
                None => Step::Error("invalid integer".to_string()),
            },
            None => Step::Incomplete,
        }
    }

    /// Parse a bulk string ($6\r\nfoobar\r\n).
    fn parse_bulk_string(&self, data: &[u8]) -> Step {
        let Some(len_pos) = find_crlf(data) else {
            return Step::Incomplete;
        };

        match parse_decimal(&data[..len_pos]) {
            Some(-1) => Step::Done(RespValue::Null, len_pos + 3),
            Some(len) if len >= 0 => {
                let len = len as usize;
                if len > MAX_BULK_SIZE {
                    return Step::Error(format!(
                        "bulk string too large: {} > {}",
                        len, MAX_BULK_SIZE
                    ));
                }

                let data_start = len_pos + 2;
                let data_end = data_start + len;

                if data.len() < data_end + 2 {
                    return Step::Incomplete;
                }

                if &data[data_end..data_end + 2] != b"\r\n" {
                    return Step::Error("missing CRLF after bulk string".to_string());
                }

                let bytes = Bytes::copy_from_slice(&data[data_start..data_end]);
                // +1 for prefix, +2 for trailing CRLF
                Step::Done(RespValue::BulkString(bytes), data_end + 3)
            }
            _ => Step::Error("invalid bulk string length".to_string()),
        }
    }

    /// Parse an array (*2\r\n...).
    fn parse_array(&mut self, data: &[u8]) -> Step {
        let Some(len_pos) = find_crlf(data) else {
            return Step::Incomplete;
        };

        match parse_decimal(&data[..len_pos]) {
            Some(-1) => Step::Done(RespValue::Null, len_pos + 3),
            Some(len) if len >= 0 => {
                let len = len as usize;
                if len > MAX_ELEMENTS {
                    return Step::Error(format!("array too large: {} > {}", len, MAX_ELEMENTS));
                }

                self.depth += 1;
                // Bounded so a hostile length cannot force a huge allocation.
                let mut elements = Vec::with_capacity(len.min(1024));
                let mut offset = len_pos + 2;

                for _ in 0..len {
                    match self.parse_value(&data[offset..]) {
                        Step::Done(value, consumed) => {
                            elements.push(value);
                            offset += consumed;
                        }
                        other => {
                            self.depth -= 1;
                            return other;
                        }
                    }
                }

                self.depth -= 1;
                // +1 for prefix
                Step::Done(RespValue::Array(elements), offset + 1)
            }
            _ => Step::Error("invalid array length".to_string()),
        }
    }

    /// Parse inline command (PING\r\n or PING arg1 arg2\r\n).
    fn parse_inline(&self, data: &[u8]) -> Step {
        match find_crlf(data) {
            Some(pos) => {
                let elements: Vec<RespValue> = data[..pos]
                    .split(|&b| b == b' ')
                    .filter(|p| !p.is_empty())
                    .map(|p| RespValue::BulkString(Bytes::copy_from_slice(p)))
                    .collect();

                // An empty line still consumes its bytes; it decodes to an
                // empty array which the command layer rejects.
                Step::Done(RespValue::Array(elements), pos + 2)
            }
            None => Step::Incomplete,
        }
    }
}

/// Internal parse step with consumed byte count.
enum Step {
    Done(RespValue, usize),
    Incomplete,
    Error(String),
}

/// RESP2 encoder.
#[derive(Debug, Default)]
pub struct Resp2Encoder;

impl Resp2Encoder {
    /// Encode a value to bytes.
    pub fn encode(value: &RespValue) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        Self::encode_into(value, &mut buf);
        buf
    }

    /// Encode a value into a buffer.
    pub fn encode_into(value: &RespValue, buf: &mut Vec<u8>) {
        match value {
            RespValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(strip_crlf(s).as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(strip_crlf(&e.to_string()).as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(data) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(elements) => {
                buf.push(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for elem in elements {
                    Self::encode_into(elem, buf);
                }
            }
            RespValue::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
        }
    }
}

/// Find CRLF in data, returning position of first \r.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn parse_decimal(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.parse().ok()
}

/// Line-based frames cannot carry CR or LF.
fn strip_crlf(s: &str) -> std::borrow::Cow<'_, str> {
    if s.contains(['\r', '\n']) {
        std::borrow::Cow::Owned(s.replace(['\r', '\n'], " "))
    } else {
        std::borrow::Cow::Borrowed(s)
    }
}

/// Parse error string into kind and message.
fn parse_error_string(s: &str) -> (String, String) {
    if let Some(pos) = s.find(' ') {
        (s[..pos].to_string(), s[pos + 1..].to_string())
    } else {
        (s.to_string(), String::new())
    }
}
