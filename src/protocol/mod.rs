//! RESP wire protocol.
//!
//! This module implements the subset of the Redis Serialization Protocol the
//! gateway speaks to clients and to the backend store:
//!
//! - [`resp2`] - RESP2 frame parser and encoder
//! - [`codec`] - Buffered frame reader/writer over an async byte stream
//!
//! Requests are arrays of bulk strings whose first element is the verb.
//! Replies may be any of simple string, error, integer, bulk string, array,
//! or null.

pub mod codec;
pub mod resp2;

pub use codec::{DecodeResult, FrameReader, ReadOutcome, RespCodec};
pub use resp2::{Resp2Encoder, Resp2Parser};

use crate::core::error::{GatewayError, GatewayResult};
use bytes::Bytes;

/// Maximum nesting depth for arrays.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum bulk string size (512MB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array elements.
pub const MAX_ELEMENTS: usize = 1_000_000;

/// RESP2 type byte prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespType {
    /// Simple string (+)
    SimpleString,
    /// Error (-)
    Error,
    /// Integer (:)
    Integer,
    /// Bulk string ($)
    BulkString,
    /// Array (*)
    Array,
}

impl RespType {
    /// Get the type from a prefix byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'+' => Some(Self::SimpleString),
            b'-' => Some(Self::Error),
            b':' => Some(Self::Integer),
            b'$' => Some(Self::BulkString),
            b'*' => Some(Self::Array),
            _ => None,
        }
    }

    /// Get the prefix byte for this type.
    pub fn prefix(&self) -> u8 {
        match self {
            Self::SimpleString => b'+',
            Self::Error => b'-',
            Self::Integer => b':',
            Self::BulkString => b'$',
            Self::Array => b'*',
        }
    }
}

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// Successfully parsed a value spanning `consumed` bytes of input.
    Ok { value: RespValue, consumed: usize },
    /// Need more data.
    Incomplete,
    /// Parse error. The input cannot be resynchronised.
    Error(String),
}

/// A RESP2 value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),

    /// Error (-ERR message\r\n)
    Error(RespError),

    /// Integer (:1000\r\n)
    Integer(i64),

    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Bytes),

    /// Array (*2\r\n...)
    Array(Vec<RespValue>),

    /// Null ($-1\r\n or *-1\r\n)
    Null,
}

impl RespValue {
    /// Create a simple string.
    pub fn simple_string(s: impl Into<String>) -> Self {
        Self::SimpleString(s.into())
    }

    /// Create an OK response.
    pub fn ok() -> Self {
        Self::SimpleString("OK".to_string())
    }

    /// Create an error.
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(RespError::new(kind, message))
    }

    /// Create a generic error.
    pub fn err(message: impl Into<String>) -> Self {
        Self::error("ERR", message)
    }

    /// Create an integer.
    pub fn integer(n: i64) -> Self {
        Self::Integer(n)
    }

    /// Create a bulk string.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::BulkString(data.into())
    }

    /// Create a bulk string from a string.
    pub fn bulk_string(s: impl AsRef<str>) -> Self {
        Self::BulkString(Bytes::copy_from_slice(s.as_ref().as_bytes()))
    }

    /// Create an array.
    pub fn array(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::SimpleString(s) => s.parse().ok(),
            Self::BulkString(b) => std::str::from_utf8(b).ok().and_then(|s| s.parse().ok()),
            _ => None,
        }
    }

    /// Try to get as array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl From<GatewayError> for RespValue {
    fn from(err: GatewayError) -> Self {
        Self::Error(err.to_resp_error())
    }
}

/// A RESP error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespError {
    /// Error kind (ERR, WRONGTYPE, ...).
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl RespError {
    /// Create a new error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new("ERR", message)
    }
}

impl std::fmt::Display for RespError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for RespError {}

/// A client command: an uppercase verb and its verbatim arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command verb, uppercased.
    verb: String,

    /// Command arguments, verbatim.
    args: Vec<Bytes>,
}

impl Command {
    /// Create a new command. The verb is uppercased.
    pub fn new(verb: impl AsRef<str>, args: Vec<Bytes>) -> Self {
        Self {
            verb: verb.as_ref().to_ascii_uppercase(),
            args,
        }
    }

    /// Build a command from string parts, e.g. `["SET", "k", "v"]`.
    pub fn from_parts<S: AsRef<str>>(parts: &[S]) -> GatewayResult<Self> {
        let (verb, rest) = parts
            .split_first()
            .ok_or_else(|| GatewayError::bad_command("empty command"))?;
        let args = rest
            .iter()
            .map(|a| Bytes::copy_from_slice(a.as_ref().as_bytes()))
            .collect();
        Ok(Self::new(verb.as_ref(), args))
    }

    /// Build a command from a decoded frame.
    ///
    /// The frame must be a non-empty array whose first element is textual.
    /// Arguments may be bulk strings, simple strings, or integers.
    pub fn from_frame(frame: RespValue) -> GatewayResult<Self> {
        let elements = match frame {
            RespValue::Array(elements) => elements,
            other => {
                return Err(GatewayError::bad_command(format!(
                    "expected array, got {}",
                    kind_name(&other)
                )))
            }
        };

        let mut iter = elements.into_iter();
        let verb = match iter.next() {
            Some(RespValue::BulkString(b)) => String::from_utf8(b.to_vec())
                .map_err(|_| GatewayError::bad_command("verb is not valid UTF-8"))?,
            Some(RespValue::SimpleString(s)) => s,
            Some(other) => {
                return Err(GatewayError::bad_command(format!(
                    "verb must be a string, got {}",
                    kind_name(&other)
                )))
            }
            None => return Err(GatewayError::bad_command("empty command")),
        };

        if verb.is_empty() {
            return Err(GatewayError::bad_command("empty verb"));
        }

        let args = iter
            .map(|v| match v {
                RespValue::BulkString(b) => Ok(b),
                RespValue::SimpleString(s) => Ok(Bytes::from(s)),
                RespValue::Integer(n) => Ok(Bytes::from(n.to_string())),
                other => Err(GatewayError::bad_command(format!(
                    "argument must be a string, got {}",
                    kind_name(&other)
                ))),
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Self::new(verb, args))
    }

    /// The uppercase verb.
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// The verbatim arguments.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Get argument as string.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Get number of arguments.
    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// Reconstruct the space-joined command line, e.g. `SET keyname keyval`.
    ///
    /// Non-UTF-8 arguments are rendered lossily.
    pub fn line(&self) -> String {
        let mut line = self.verb.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&String::from_utf8_lossy(arg));
        }
        line
    }

    /// Convert to a RESP request frame (array of bulk strings).
    pub fn to_frame(&self) -> RespValue {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(RespValue::bulk_string(&self.verb));
        items.extend(self.args.iter().cloned().map(RespValue::BulkString));
        RespValue::Array(items)
    }

    /// Canonical wire encoding of this command.
    ///
    /// This is the payload appended to the log, so identical commands always
    /// produce identical bytes regardless of how the client framed them.
    pub fn to_bytes(&self) -> Vec<u8> {
        Resp2Encoder::encode(&self.to_frame())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.line())
    }
}

fn kind_name(value: &RespValue) -> &'static str {
    match value {
        RespValue::SimpleString(_) => "simple string",
        RespValue::Error(_) => "error",
        RespValue::Integer(_) => "integer",
        RespValue::BulkString(_) => "bulk string",
        RespValue::Array(_) => "array",
        RespValue::Null => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resp_type_from_byte() {
        assert_eq!(RespType::from_byte(b'+'), Some(RespType::SimpleString));
        assert_eq!(RespType::from_byte(b'-'), Some(RespType::Error));
        assert_eq!(RespType::from_byte(b':'), Some(RespType::Integer));
        assert_eq!(RespType::from_byte(b'$'), Some(RespType::BulkString));
        assert_eq!(RespType::from_byte(b'*'), Some(RespType::Array));
        assert_eq!(RespType::from_byte(b'%'), None);
        assert_eq!(RespType::Array.prefix(), b'*');
    }

    #[test]
    fn test_resp_value_accessors() {
        let s = RespValue::simple_string("hello");
        assert_eq!(s.as_str(), Some("hello"));

        let n = RespValue::integer(42);
        assert_eq!(n.as_int(), Some(42));

        let arr = RespValue::array(vec![RespValue::integer(1), RespValue::integer(2)]);
        assert_eq!(arr.as_array().map(|a| a.len()), Some(2));

        assert!(RespValue::Null.is_null());
        assert!(RespValue::err("boom").is_error());
    }

    #[test]
    fn test_resp_error_display() {
        assert_eq!(RespError::generic("boom").to_string(), "ERR boom");
        assert_eq!(RespError::new("NOAUTH", "").to_string(), "NOAUTH");
    }

    #[test]
    fn test_command_from_frame_uppercases_verb_only() {
        let frame = RespValue::Array(vec![
            RespValue::bulk_string("set"),
            RespValue::bulk_string("Key"),
            RespValue::bulk_string("vAlue"),
        ]);

        let cmd = Command::from_frame(frame).unwrap();
        assert_eq!(cmd.verb(), "SET");
        assert_eq!(cmd.argc(), 2);
        assert_eq!(cmd.arg_str(0), Some("Key"));
        assert_eq!(cmd.arg_str(1), Some("vAlue"));
    }

    #[test]
    fn test_command_from_frame_accepts_integer_args() {
        let frame = RespValue::Array(vec![
            RespValue::bulk_string("EXPIRE"),
            RespValue::bulk_string("k"),
            RespValue::Integer(10),
        ]);
        let cmd = Command::from_frame(frame).unwrap();
        assert_eq!(cmd.line(), "EXPIRE k 10");
    }

    #[test]
    fn test_command_from_frame_rejects_malformed() {
        assert!(matches!(
            Command::from_frame(RespValue::Array(vec![])),
            Err(GatewayError::BadCommand { .. })
        ));
        assert!(matches!(
            Command::from_frame(RespValue::Array(vec![RespValue::Integer(1)])),
            Err(GatewayError::BadCommand { .. })
        ));
        assert!(matches!(
            Command::from_frame(RespValue::bulk_string("GET")),
            Err(GatewayError::BadCommand { .. })
        ));
        assert!(matches!(
            Command::from_frame(RespValue::Array(vec![
                RespValue::bulk_string("GET"),
                RespValue::Array(vec![]),
            ])),
            Err(GatewayError::BadCommand { .. })
        ));
    }

    #[test]
    fn test_command_line() {
        let cmd = Command::from_parts(&["SET", "keyname", "keyval"]).unwrap();
        assert_eq!(cmd.line(), "SET keyname keyval");

        let cmd = Command::from_parts(&["ping"]).unwrap();
        assert_eq!(cmd.line(), "PING");
        assert!(Command::from_parts::<&str>(&[]).is_err());
    }

    #[test]
    fn test_command_to_bytes_is_canonical() {
        let a = Command::from_parts(&["set", "k", "v"]).unwrap();
        let b = Command::from_frame(RespValue::Array(vec![
            RespValue::simple_string("SET"),
            RespValue::simple_string("k"),
            RespValue::bulk_string("v"),
        ]))
        .unwrap();

        assert_eq!(a.to_bytes(), b.to_bytes());
        assert_eq!(a.to_bytes(), b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
    }
}
