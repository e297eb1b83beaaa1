//! Producer front-end for write commands.
//!
//! A [`Committer`] owns a [`StreamBinding`] for its whole lifetime and turns
//! each write command into a [`StreamRecord`]:
//!
//! - `topic` comes from the binding's stream configuration
//! - `key` is the xxHash64 (seed 0) of the command's canonical wire bytes,
//!   so every gateway instance derives the same key for the same command
//! - `value` is the canonical wire bytes
//! - `metadata` is passed through from the caller

use super::{
    start_producer, BindingLease, ProducerError, ProducerMessage, StreamBinding, StreamRecord,
};
use crate::core::error::{StreamError, StreamResult};
use crate::protocol::Command;
use parking_lot::Mutex;
use std::hash::Hasher;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use twox_hash::XxHash64;

/// Acknowledgement of one appended record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendAck {
    /// Topic the record was appended to.
    pub topic: String,
    /// Partition key of the record.
    pub key: u64,
    /// Offset within the topic.
    pub offset: u64,
}

/// Resolves once the log has accepted or rejected one specific record.
#[derive(Debug)]
pub struct AppendReceipt {
    topic: String,
    key: u64,
    rx: oneshot::Receiver<StreamResult<u64>>,
}

impl AppendReceipt {
    /// Partition key of the pending record.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Wait for the delivery outcome.
    pub async fn wait(self) -> StreamResult<AppendAck> {
        let offset = self.rx.await.map_err(|_| StreamError::ProducerClosed)??;
        Ok(AppendAck {
            topic: self.topic,
            key: self.key,
            offset,
        })
    }
}

/// Partition key for a command payload.
pub fn partition_key(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(bytes);
    hasher.finish()
}

/// Appends write commands to the bound log stream.
pub struct Committer {
    topic: String,
    lease: Mutex<Option<BindingLease>>,
    input: Mutex<Option<mpsc::Sender<ProducerMessage>>>,
    errors: Mutex<Option<mpsc::Receiver<ProducerError>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Committer {
    /// Acquire the binding and start a producer on its client.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// `AlreadyInUse` if another committer holds the binding.
    pub fn from_binding(binding: &Arc<StreamBinding>) -> StreamResult<Self> {
        let lease = binding.acquire()?;
        let producer = start_producer(Arc::clone(binding.client()), binding.channel_capacity());

        tracing::info!(
            topic = %binding.config().topic,
            address = %binding.client().address(),
            "committer started"
        );

        Ok(Self {
            topic: binding.config().topic.clone(),
            lease: Mutex::new(Some(lease)),
            input: Mutex::new(Some(producer.input)),
            errors: Mutex::new(Some(producer.errors)),
            task: Mutex::new(Some(producer.task)),
        })
    }

    /// Topic records are appended to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Enqueue a command for appending.
    ///
    /// Returns once the record is queued; waits only if the producer queue is
    /// full. The returned receipt resolves with this record's outcome.
    pub async fn write(
        &self,
        command: &Command,
        metadata: serde_json::Value,
    ) -> StreamResult<AppendReceipt> {
        let input = self
            .input
            .lock()
            .as_ref()
            .cloned()
            .ok_or(StreamError::ProducerClosed)?;

        let value = command.to_bytes();
        let key = partition_key(&value);
        let (ack, rx) = oneshot::channel();

        input
            .send(ProducerMessage {
                record: StreamRecord {
                    topic: self.topic.clone(),
                    key,
                    value,
                    metadata,
                },
                ack: Some(ack),
            })
            .await
            .map_err(|_| StreamError::ProducerClosed)?;

        tracing::trace!(topic = %self.topic, key, verb = %command.verb(), "write enqueued");

        Ok(AppendReceipt {
            topic: self.topic.clone(),
            key,
            rx,
        })
    }

    /// Hand the delivery error channel to `callback`.
    ///
    /// The channel can only be taken once; returns `false` if it was already
    /// handed out.
    pub fn error_listener<F>(&self, callback: F) -> bool
    where
        F: FnOnce(mpsc::Receiver<ProducerError>),
    {
        match self.errors.lock().take() {
            Some(errors) => {
                callback(errors);
                true
            }
            None => false,
        }
    }

    /// Check if the committer still accepts writes.
    pub fn is_open(&self) -> bool {
        self.input.lock().is_some()
    }

    /// Stop accepting writes, drain queued records, and release the binding.
    pub async fn close(&self) {
        // Dropping the last sender ends the delivery loop once it drains.
        drop(self.input.lock().take());

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "producer task failed");
            }
        }

        if let Some(lease) = self.lease.lock().take() {
            lease.release();
            tracing::info!(topic = %self.topic, "committer closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{MemoryLog, StreamOptions};
    use serde_json::json;

    fn binding(name: &str) -> Arc<StreamBinding> {
        StreamBinding::bind(StreamOptions::new(
            vec![format!("mem://{}", name)],
            "committer-test",
            "writes",
        ))
        .unwrap()
    }

    #[test]
    fn test_partition_key_is_deterministic() {
        let a = Command::from_parts(&["SET", "k", "v"]).unwrap();
        let b = Command::from_parts(&["set", "k", "v"]).unwrap();
        let c = Command::from_parts(&["SET", "k", "w"]).unwrap();

        assert_eq!(partition_key(&a.to_bytes()), partition_key(&b.to_bytes()));
        assert_ne!(partition_key(&a.to_bytes()), partition_key(&c.to_bytes()));
    }

    #[tokio::test]
    async fn test_write_appends_record() {
        let binding = binding("committer-write");
        let committer = Committer::from_binding(&binding).unwrap();
        let cmd = Command::from_parts(&["SET", "keyname", "keyval"]).unwrap();

        let receipt = committer
            .write(&cmd, json!({ "conn": 1 }))
            .await
            .unwrap();
        let ack = receipt.wait().await.unwrap();

        assert_eq!(ack.topic, "writes");
        assert_eq!(ack.offset, 0);
        assert_eq!(ack.key, partition_key(&cmd.to_bytes()));

        let records = MemoryLog::open("committer-write").records("writes");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, cmd.to_bytes());
        assert_eq!(records[0].metadata, json!({ "conn": 1 }));
    }

    #[tokio::test]
    async fn test_from_binding_requires_ownership() {
        let binding = binding("committer-owner");
        let first = Committer::from_binding(&binding).unwrap();
        assert!(matches!(
            Committer::from_binding(&binding),
            Err(StreamError::AlreadyInUse)
        ));

        first.close().await;
        assert!(!binding.is_in_use());
        assert!(Committer::from_binding(&binding).is_ok());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let committer = Committer::from_binding(&binding("committer-closed")).unwrap();
        committer.close().await;

        let cmd = Command::from_parts(&["DEL", "k"]).unwrap();
        assert!(matches!(
            committer.write(&cmd, json!(null)).await,
            Err(StreamError::ProducerClosed)
        ));
    }

    #[tokio::test]
    async fn test_error_listener_is_handed_out_once() {
        let committer = Committer::from_binding(&binding("committer-errors")).unwrap();
        MemoryLog::open("committer-errors").fail_next(1);

        let (tx, rx) = oneshot::channel();
        assert!(committer.error_listener(move |errors| {
            let _ = tx.send(errors);
        }));
        assert!(!committer.error_listener(|_| {}));

        let cmd = Command::from_parts(&["INCR", "n"]).unwrap();
        let receipt = committer.write(&cmd, json!(null)).await.unwrap();
        assert!(matches!(receipt.wait().await, Err(StreamError::Delivery { .. })));

        let mut errors = rx.await.unwrap();
        let failure = errors.recv().await.unwrap();
        assert_eq!(failure.record.value, cmd.to_bytes());
    }
}
