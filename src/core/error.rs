//! Error types and RESP reply mapping.
//!
//! Two error families exist:
//!
//! - [`GatewayError`] covers the client-facing path (decode, classification,
//!   dispatch, backend forwarding). Every variant can be reported in-protocol
//!   via [`GatewayError::to_resp_error`].
//! - [`StreamError`] covers the commit layer (binding, producer, delivery).
//!   It is `Clone` so one delivery failure can be handed to both the error
//!   channel and the per-write receipt.

use crate::protocol::RespError;
use thiserror::Error;

/// Errors raised on the client-facing path.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The frame is not a valid command (empty, non-textual verb, ...).
    #[error("bad command: {reason}")]
    BadCommand { reason: String },

    /// The verb is on the blacklist.
    #[error("blacklisted command")]
    Blacklisted,

    /// No handler is registered for the command's classification.
    #[error("handler is not set")]
    HandlerUnset,

    /// No resolver is installed. Fatal for the session.
    #[error("resolver is not set")]
    ResolverUnset,

    /// The backend store could not be reached or misbehaved.
    #[error("backend: {message}")]
    Backend { message: String },

    /// The write could not be committed to the log.
    #[error("commit: {0}")]
    Commit(#[from] StreamError),

    /// Socket failure. Fatal for the session.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Create a BadCommand error.
    pub fn bad_command(reason: impl Into<String>) -> Self {
        Self::BadCommand {
            reason: reason.into(),
        }
    }

    /// Create a Backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if the client may retry the same command.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Backend { .. } => true,
            Self::Commit(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Map to the RESP error reply sent to the client.
    pub fn to_resp_error(&self) -> RespError {
        RespError::new(RespErrorMapping::to_error_prefix(self), format!("gateway: {}", self))
    }
}

/// Result type using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised by the commit layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// Another committer already holds the binding.
    #[error("stream binding is already in use")]
    AlreadyInUse,

    /// Binding options are missing or malformed.
    #[error("invalid stream config: {message}")]
    ConfigInvalid { message: String },

    /// The log rejected or failed to persist a record.
    #[error("delivery to topic {topic} failed: {message}")]
    Delivery { topic: String, message: String },

    /// The producer has shut down and accepts no more records.
    #[error("producer is closed")]
    ProducerClosed,

    /// Record could not be encoded for the log.
    #[error("encode: {message}")]
    Encode { message: String },

    /// Log storage I/O failure.
    #[error("log io: {message}")]
    Io { message: String },
}

impl StreamError {
    /// Create a ConfigInvalid error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
        }
    }

    /// Create a Delivery error.
    pub fn delivery(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Check if the write may succeed when retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Delivery { .. } | Self::Io { .. })
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Result type using StreamError.
pub type StreamResult<T> = Result<T, StreamError>;

// ============================================================================
// RESP error mapping
// ============================================================================

/// Maps gateway errors to RESP error prefixes.
pub struct RespErrorMapping;

impl RespErrorMapping {
    /// Map a GatewayError to a Redis error prefix.
    pub fn to_error_prefix(error: &GatewayError) -> &'static str {
        match error {
            GatewayError::Commit(StreamError::Delivery { .. }) => "TRYAGAIN",
            GatewayError::Commit(StreamError::ProducerClosed) => "LOADING",
            _ => "ERR",
        }
    }
}
