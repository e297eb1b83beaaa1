//! In-process shared log.
//!
//! Logs are registered process-wide by name, so every client connecting to
//! `mem://<name>` appends to the same ordered sequence. Used for local runs
//! and tests.

use super::{LogClient, StreamRecord};
use crate::core::error::{StreamError, StreamResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

static REGISTRY: LazyLock<Mutex<HashMap<String, Arc<MemoryLog>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// A named in-memory log.
#[derive(Debug, Default)]
pub struct MemoryLog {
    name: String,
    topics: RwLock<HashMap<String, Vec<StreamRecord>>>,
    /// Remaining appends to reject.
    failures: AtomicUsize,
}

impl MemoryLog {
    /// Open (or create) the log registered under `name`.
    pub fn open(name: &str) -> Arc<Self> {
        let mut registry = REGISTRY.lock();
        Arc::clone(registry.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Self {
                name: name.to_string(),
                ..Self::default()
            })
        }))
    }

    /// Log name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the records appended to `topic`, in log order.
    pub fn records(&self, topic: &str) -> Vec<StreamRecord> {
        self.topics.read().get(topic).cloned().unwrap_or_default()
    }

    /// Number of records in `topic`.
    pub fn len(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map_or(0, Vec::len)
    }

    /// Check if `topic` has no records.
    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Reject the next `n` appends with a delivery error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    fn append(&self, record: &StreamRecord) -> StreamResult<u64> {
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StreamError::delivery(&record.topic, "injected failure"));
        }

        let mut topics = self.topics.write();
        let records = topics.entry(record.topic.clone()).or_default();
        records.push(record.clone());
        Ok(records.len() as u64 - 1)
    }
}

/// Client for a [`MemoryLog`].
pub struct MemoryLogClient {
    log: Arc<MemoryLog>,
    client_id: String,
}

impl MemoryLogClient {
    /// Connect to the in-memory log named `name`.
    pub fn connect(name: &str, client_id: &str) -> StreamResult<Self> {
        if name.is_empty() {
            return Err(StreamError::config_invalid("mem:// address needs a log name"));
        }
        Ok(Self {
            log: MemoryLog::open(name),
            client_id: client_id.to_string(),
        })
    }

    /// The underlying log.
    pub fn log(&self) -> &Arc<MemoryLog> {
        &self.log
    }
}

impl LogClient for MemoryLogClient {
    fn append(&self, record: &StreamRecord) -> StreamResult<u64> {
        self.log.append(record)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn address(&self) -> String {
        format!("mem://{}", self.log.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(topic: &str) -> StreamRecord {
        StreamRecord {
            topic: topic.to_string(),
            key: 1,
            value: b"v".to_vec(),
            metadata: json!(null),
        }
    }

    #[test]
    fn test_clients_share_named_log() {
        let a = MemoryLogClient::connect("memory-shared", "a").unwrap();
        let b = MemoryLogClient::connect("memory-shared", "b").unwrap();

        assert_eq!(a.append(&record("t")).unwrap(), 0);
        assert_eq!(b.append(&record("t")).unwrap(), 1);
        assert_eq!(b.append(&record("other")).unwrap(), 0);
        assert_eq!(MemoryLog::open("memory-shared").len("t"), 2);
    }

    #[test]
    fn test_fail_next() {
        let client = MemoryLogClient::connect("memory-fail", "a").unwrap();
        client.log().fail_next(2);

        assert!(client.append(&record("t")).is_err());
        assert!(client.append(&record("t")).is_err());
        assert_eq!(client.append(&record("t")).unwrap(), 0);
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            MemoryLogClient::connect("", "a"),
            Err(StreamError::ConfigInvalid { .. })
        ));
    }
}
