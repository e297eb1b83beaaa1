//! Buffered RESP framing over async byte streams.
//!
//! [`RespCodec`] splits complete frames off the front of a [`BytesMut`]
//! buffer. [`FrameReader`] owns the read half of a connection and the buffer,
//! and turns socket reads into [`ReadOutcome`]s with an optional per-read
//! deadline:
//!
//! ```text
//!   socket ──read_buf──► BytesMut ──RespCodec::decode──► RespValue
//!                            ▲                                │
//!                            └──── Incomplete: read again ◄───┘
//! ```

use super::{ParseResult, Resp2Encoder, Resp2Parser, RespValue};
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Initial read buffer capacity.
const INITIAL_BUFFER: usize = 4096;

/// Result of attempting to decode one frame from a buffer.
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// A complete frame was decoded and its bytes consumed.
    Complete(T),
    /// More data is needed.
    Incomplete,
    /// The buffer does not hold valid RESP.
    Invalid(String),
}

/// RESP2 codec.
#[derive(Debug, Default)]
pub struct RespCodec {
    parser: Resp2Parser,
}

impl RespCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to decode one value from the front of the buffer.
    ///
    /// On `Complete`, exactly the bytes of the decoded frame are removed from
    /// `buffer`; any pipelined frames behind it stay in place.
    pub fn decode(&mut self, buffer: &mut BytesMut) -> DecodeResult<RespValue> {
        if buffer.is_empty() {
            return DecodeResult::Incomplete;
        }

        match self.parser.parse(buffer) {
            ParseResult::Ok { value, consumed } => {
                let _ = buffer.split_to(consumed);
                DecodeResult::Complete(value)
            }
            ParseResult::Incomplete => DecodeResult::Incomplete,
            ParseResult::Error(e) => DecodeResult::Invalid(e),
        }
    }

    /// Encode a value to wire bytes.
    pub fn encode(&self, value: &RespValue) -> Vec<u8> {
        Resp2Encoder::encode(value)
    }
}

/// Outcome of one [`FrameReader::read_frame`] call.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete frame.
    Frame(RespValue),
    /// The deadline elapsed before a full frame arrived. Buffered bytes are
    /// kept, so the caller may simply read again.
    Timeout,
    /// The peer closed the connection.
    Closed,
    /// The peer sent bytes that are not RESP.
    Invalid(String),
    /// Hard I/O failure.
    Failed(io::Error),
}

/// Frame reader over the read half of a connection.
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
    codec: RespCodec,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a new frame reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER),
            codec: RespCodec::new(),
        }
    }

    /// Number of bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read the next frame.
    ///
    /// With `deadline` set, each socket read is bounded by it and an elapsed
    /// deadline yields [`ReadOutcome::Timeout`]. Frames already buffered are
    /// returned without touching the socket.
    pub async fn read_frame(&mut self, deadline: Option<Duration>) -> ReadOutcome {
        loop {
            match self.codec.decode(&mut self.buffer) {
                DecodeResult::Complete(value) => return ReadOutcome::Frame(value),
                DecodeResult::Invalid(e) => return ReadOutcome::Invalid(e),
                DecodeResult::Incomplete => {}
            }

            let read = match deadline {
                Some(limit) => {
                    match tokio::time::timeout(limit, self.reader.read_buf(&mut self.buffer)).await
                    {
                        Ok(result) => result,
                        Err(_) => return ReadOutcome::Timeout,
                    }
                }
                None => self.reader.read_buf(&mut self.buffer).await,
            };

            match read {
                Ok(0) => return ReadOutcome::Closed,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return ReadOutcome::Timeout,
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
    }
}
