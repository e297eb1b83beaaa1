//! Commit layer: ordered append log for write commands.
//!
//! Writes are serialized through a single log stream so that several gateway
//! instances agree on write order without talking to each other:
//!
//! ```text
//!   write handler ──Committer::write──► AsyncProducer ──► LogClient::append
//!        ▲                                   │                  │
//!        └──────── AppendReceipt ◄───────────┘◄── offset/error ─┘
//! ```
//!
//! - [`binding`] - single-owner binding to a log stream
//! - [`committer`] - producer front-end with deterministic partition keys
//! - [`memory`] - in-process shared log (`mem://<name>`)
//! - [`file`] - segmented on-disk log (`file://<dir>`)

pub mod binding;
pub mod committer;
pub mod file;
pub mod memory;

pub use binding::{BindingLease, StreamBinding, StreamConfig, StreamOptions};
pub use committer::{AppendAck, AppendReceipt, Committer};
pub use file::FileLog;
pub use memory::MemoryLog;

use crate::core::error::{StreamError, StreamResult};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A record appended to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    /// Destination topic.
    pub topic: String,
    /// Partition key.
    pub key: u64,
    /// Payload (canonical command bytes).
    pub value: Vec<u8>,
    /// Caller-supplied metadata carried alongside the payload.
    pub metadata: serde_json::Value,
}

/// Transport to an ordered append log.
pub trait LogClient: Send + Sync {
    /// Durably append a record, returning its offset within the topic.
    fn append(&self, record: &StreamRecord) -> StreamResult<u64>;

    /// Identifier this client presented when connecting.
    fn client_id(&self) -> &str;

    /// Address the client is connected to.
    fn address(&self) -> String;
}

/// Connect a log client.
///
/// Addresses are tried in order and the first that connects wins. Supported
/// schemes are `mem://<name>` and `file://<dir>`.
pub fn connect(
    addresses: &[String],
    client_id: &str,
    segment_bytes: u64,
) -> StreamResult<Arc<dyn LogClient>> {
    if addresses.is_empty() {
        return Err(StreamError::config_invalid("no log addresses"));
    }

    let mut last_error = None;
    for address in addresses {
        let result: StreamResult<Arc<dyn LogClient>> =
            if let Some(name) = address.strip_prefix("mem://") {
                memory::MemoryLogClient::connect(name, client_id)
                    .map(|c| Arc::new(c) as Arc<dyn LogClient>)
            } else if let Some(dir) = address.strip_prefix("file://") {
                file::FileLogClient::connect(dir, client_id, segment_bytes)
                    .map(|c| Arc::new(c) as Arc<dyn LogClient>)
            } else {
                Err(StreamError::config_invalid(format!(
                    "unsupported log address: {}",
                    address
                )))
            };

        match result {
            Ok(client) => {
                tracing::debug!(address = %address, client_id = %client_id, "log client connected");
                return Ok(client);
            }
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "log address unavailable");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| StreamError::config_invalid("no log addresses")))
}

/// A record queued for the producer, with an optional acknowledgement.
#[derive(Debug)]
pub struct ProducerMessage {
    /// Record to append.
    pub record: StreamRecord,
    /// Completed with the offset or delivery error of this record.
    pub ack: Option<oneshot::Sender<StreamResult<u64>>>,
}

/// A delivery failure reported on the producer's error channel.
#[derive(Debug, Clone)]
pub struct ProducerError {
    /// The record that failed.
    pub record: StreamRecord,
    /// Why it failed.
    pub error: StreamError,
}

/// Asynchronous producer bound to a log client.
///
/// Records are appended strictly in the order they are enqueued.
pub struct AsyncProducer {
    /// Record queue.
    pub input: mpsc::Sender<ProducerMessage>,
    /// Delivery failures.
    pub errors: mpsc::Receiver<ProducerError>,
    /// Delivery loop.
    pub task: JoinHandle<()>,
}

/// Start an asynchronous producer on a connected client.
///
/// `capacity` bounds both the record queue and the error channel. When nobody
/// drains the error channel and it fills up, further failures are logged and
/// dropped; the per-record acknowledgement still carries them.
pub fn start_producer(client: Arc<dyn LogClient>, capacity: usize) -> AsyncProducer {
    let (input, mut rx) = mpsc::channel::<ProducerMessage>(capacity.max(1));
    let (errors_tx, errors) = mpsc::channel::<ProducerError>(capacity.max(1));

    let task = tokio::spawn(async move {
        while let Some(ProducerMessage { record, ack }) = rx.recv().await {
            let appender = Arc::clone(&client);
            let pending = record.clone();
            let result = match tokio::task::spawn_blocking(move || appender.append(&pending)).await
            {
                Ok(result) => result,
                Err(e) => Err(StreamError::delivery(&record.topic, e.to_string())),
            };

            match result {
                Ok(offset) => {
                    tracing::trace!(topic = %record.topic, key = record.key, offset, "record appended");
                    if let Some(ack) = ack {
                        let _ = ack.send(Ok(offset));
                    }
                }
                Err(error) => {
                    tracing::warn!(topic = %record.topic, key = record.key, error = %error, "record delivery failed");
                    if let Some(ack) = ack {
                        let _ = ack.send(Err(error.clone()));
                    }
                    if errors_tx.try_send(ProducerError { record, error }).is_err() {
                        tracing::debug!("producer error channel full or closed");
                    }
                }
            }
        }
        tracing::debug!(client_id = %client.client_id(), "producer stopped");
    });

    AsyncProducer {
        input,
        errors,
        task,
    }
}
