//! Stream binding and committer tests.

mod common;

use common::{assert_err, assert_ok, mem_binding, temp_test_dir};
use ledgate::core::error::StreamError;
use ledgate::protocol::Command;
use ledgate::stream::committer::partition_key;
use ledgate::stream::{AppendAck, Committer, FileLog, MemoryLog, StreamBinding, StreamOptions};
use serde_json::json;
use std::sync::Arc;

// ============================================================================
// Binding tests
// ============================================================================

#[test]
fn concurrent_acquire_has_one_winner() {
    let binding = mem_binding("stream-concurrent", "writes");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let binding = Arc::clone(&binding);
            std::thread::spawn(move || binding.acquire())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(e) = result {
            assert_eq!(*e, StreamError::AlreadyInUse);
        }
    }
    assert!(binding.is_in_use());

    drop(results);
    assert!(!binding.is_in_use());
}

#[test]
fn released_binding_can_be_reacquired() {
    let binding = mem_binding("stream-reacquire", "writes");

    let lease = assert_ok(binding.acquire());
    assert_eq!(assert_err(binding.acquire()), StreamError::AlreadyInUse);
    lease.release();

    assert_ok(binding.acquire());
}

#[test]
fn bind_rejects_bad_options() {
    let empty = StreamOptions::new(Vec::new(), "c", "t");
    assert!(matches!(
        StreamBinding::bind(empty),
        Err(StreamError::ConfigInvalid { .. })
    ));

    let no_topic = StreamOptions::new(vec!["mem://x".to_string()], "c", "");
    assert!(matches!(
        StreamBinding::bind(no_topic),
        Err(StreamError::ConfigInvalid { .. })
    ));

    let bad_scheme = StreamOptions::new(vec!["kafka://broker:9092".to_string()], "c", "t");
    assert!(matches!(
        StreamBinding::bind(bad_scheme),
        Err(StreamError::ConfigInvalid { .. })
    ));
}

#[test]
fn bind_falls_through_to_next_address() {
    let options = StreamOptions::new(
        vec!["mem://".to_string(), "mem://stream-fallback".to_string()],
        "c",
        "t",
    );
    let binding = assert_ok(StreamBinding::bind(options));
    assert_eq!(binding.client().address(), "mem://stream-fallback");
}

// ============================================================================
// Partition key tests
// ============================================================================

#[test]
fn partition_key_is_deterministic() {
    let a = Command::from_parts(&["SET", "k", "v"]).unwrap();
    let b = Command::from_parts(&["set", "k", "v"]).unwrap();
    let c = Command::from_parts(&["SET", "k", "w"]).unwrap();

    assert_eq!(partition_key(&a.to_bytes()), partition_key(&a.to_bytes()));
    // The verb is normalized before encoding.
    assert_eq!(partition_key(&a.to_bytes()), partition_key(&b.to_bytes()));
    assert_ne!(partition_key(&a.to_bytes()), partition_key(&c.to_bytes()));
}

// ============================================================================
// Committer tests
// ============================================================================

#[tokio::test]
async fn committer_appends_in_order() {
    let binding = mem_binding("stream-order", "writes");
    let committer = assert_ok(Committer::from_binding(&binding));

    let mut receipts = Vec::new();
    for i in 0..10 {
        let cmd = Command::from_parts(&["SET", "k", &i.to_string()]).unwrap();
        receipts.push(assert_ok(committer.write(&cmd, json!({ "i": i })).await));
    }

    for (i, receipt) in receipts.into_iter().enumerate() {
        let ack: AppendAck = assert_ok(receipt.wait().await);
        assert_eq!(ack.offset, i as u64);
        assert_eq!(ack.topic, "writes");
    }

    let records = MemoryLog::open("stream-order").records("writes");
    assert_eq!(records.len(), 10);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.metadata["i"], i);
        assert_eq!(record.key, partition_key(&record.value));
    }

    committer.close().await;
}

#[tokio::test]
async fn second_committer_is_refused() {
    let binding = mem_binding("stream-exclusive", "writes");
    let first = assert_ok(Committer::from_binding(&binding));

    assert!(matches!(
        Committer::from_binding(&binding),
        Err(StreamError::AlreadyInUse)
    ));

    first.close().await;
    let second = assert_ok(Committer::from_binding(&binding));
    second.close().await;
}

#[tokio::test]
async fn delivery_failure_reaches_receipt_and_listener() {
    let binding = mem_binding("stream-failure", "writes");
    let committer = assert_ok(Committer::from_binding(&binding));

    let mut errors = None;
    assert!(committer.error_listener(|rx| errors = Some(rx)));
    assert!(!committer.error_listener(|_| {}));
    let mut errors = errors.unwrap();

    MemoryLog::open("stream-failure").fail_next(1);
    let cmd = Command::from_parts(&["DEL", "k"]).unwrap();
    let receipt = assert_ok(committer.write(&cmd, json!({})).await);

    let err = assert_err(receipt.wait().await);
    assert!(matches!(err, StreamError::Delivery { .. }));

    let reported = errors.recv().await.unwrap();
    assert_eq!(reported.record.value, cmd.to_bytes());
    assert!(reported.error.is_retriable());

    // The next write goes through.
    let receipt = assert_ok(committer.write(&cmd, json!({})).await);
    assert_eq!(assert_ok(receipt.wait().await).offset, 0);

    committer.close().await;
}

#[tokio::test]
async fn closed_committer_refuses_writes() {
    let binding = mem_binding("stream-closed", "writes");
    let committer = assert_ok(Committer::from_binding(&binding));
    committer.close().await;

    assert!(!committer.is_open());
    assert!(!binding.is_in_use());

    let cmd = Command::from_parts(&["SET", "k", "v"]).unwrap();
    assert!(matches!(
        committer.write(&cmd, json!({})).await,
        Err(StreamError::ProducerClosed)
    ));
}

// ============================================================================
// File log tests
// ============================================================================

#[tokio::test]
async fn committer_writes_file_log() {
    let dir = temp_test_dir();
    let address = format!("file://{}", dir.path().display());

    let binding = assert_ok(StreamBinding::bind(StreamOptions::new(
        vec![address],
        "file-test",
        "writes",
    )));
    let committer = assert_ok(Committer::from_binding(&binding));

    for value in ["a", "b", "c"] {
        let cmd = Command::from_parts(&["SET", "k", value]).unwrap();
        let receipt = assert_ok(committer.write(&cmd, json!({ "v": value })).await);
        assert_ok(receipt.wait().await);
    }
    committer.close().await;
    drop(binding);

    let log = assert_ok(FileLog::open(dir.path(), 64 * 1024 * 1024));
    let entries = assert_ok(log.read_topic("writes"));
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].offset, 2);
    assert_eq!(entries[2].client_id, "file-test");
    assert_eq!(assert_ok(entries[2].metadata_json())["v"], "c");

    let expected = Command::from_parts(&["SET", "k", "a"]).unwrap().to_bytes();
    assert_eq!(entries[0].value, expected);
}

#[tokio::test]
async fn file_log_offsets_survive_reopen() {
    let dir = temp_test_dir();
    let address = format!("file://{}", dir.path().display());
    let cmd = Command::from_parts(&["INCR", "n"]).unwrap();

    for expected in 0..2u64 {
        let binding = assert_ok(StreamBinding::bind(StreamOptions::new(
            vec![address.clone()],
            "file-test",
            "writes",
        )));
        let committer = assert_ok(Committer::from_binding(&binding));
        let receipt = assert_ok(committer.write(&cmd, json!({})).await);
        assert_eq!(assert_ok(receipt.wait().await).offset, expected);
        committer.close().await;
    }
}
