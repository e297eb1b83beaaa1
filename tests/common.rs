//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use ledgate::core::error::GatewayError;
use ledgate::gateway::{Classification, Gateway, GatewayOptions, HandlerContext};
use ledgate::protocol::{Command, FrameReader, ReadOutcome, RespValue};
use ledgate::stream::{StreamBinding, StreamOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// How long a test waits for a single reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind a gateway on an ephemeral port with no handlers registered.
pub async fn bind_gateway(options: GatewayOptions) -> Arc<Gateway> {
    Arc::new(
        Gateway::bind("127.0.0.1:0", options)
            .await
            .expect("Failed to bind gateway"),
    )
}

/// Start the accept loop of a gateway.
pub fn spawn_listen(gateway: &Arc<Gateway>) -> JoinHandle<()> {
    let gateway = Arc::clone(gateway);
    tokio::spawn(async move {
        gateway.listen().await.expect("listen failed");
    })
}

/// Register the reference handlers: reads reply `OK`, writes echo the
/// command line back.
pub fn register_echo_handlers(gateway: &Gateway) {
    gateway.register_handler(
        Classification::Read,
        |_ctx: HandlerContext, _cmd: Command| async move {
            Ok::<_, GatewayError>(RespValue::ok())
        },
    );
    gateway.register_handler(
        Classification::Write,
        |_ctx: HandlerContext, cmd: Command| async move {
            Ok::<_, GatewayError>(RespValue::simple_string(cmd.line()))
        },
    );
}

/// Bind a `mem://` stream unique to the calling test.
pub fn mem_binding(name: &str, topic: &str) -> Arc<StreamBinding> {
    StreamBinding::bind(StreamOptions::new(
        vec![format!("mem://{}", name)],
        "test-client",
        topic,
    ))
    .expect("Failed to bind stream")
}

/// Write a config file with the given TOML content.
pub fn create_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Minimal RESP client.
pub struct TestClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect to a gateway.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        let (read, write) = stream.into_split();
        Self {
            reader: FrameReader::new(read),
            writer: write,
        }
    }

    /// Send a command without waiting for the reply.
    pub async fn send(&mut self, parts: &[&str]) {
        let cmd = Command::from_parts(parts).expect("invalid test command");
        self.send_raw(&cmd.to_bytes()).await;
    }

    /// Send raw bytes.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("Failed to write");
    }

    /// Read the next reply, panicking if none arrives.
    pub async fn recv(&mut self) -> RespValue {
        match self.reader.read_frame(Some(REPLY_TIMEOUT)).await {
            ReadOutcome::Frame(value) => value,
            other => panic!("Expected a reply, got {:?}", other),
        }
    }

    /// Read the next outcome without interpreting it.
    pub async fn recv_outcome(&mut self, timeout: Duration) -> ReadOutcome {
        self.reader.read_frame(Some(timeout)).await
    }

    /// Send a command and read its reply.
    pub async fn call(&mut self, parts: &[&str]) -> RespValue {
        self.send(parts).await;
        self.recv().await
    }
}

/// Message of an error reply.
#[track_caller]
pub fn error_message(reply: &RespValue) -> &str {
    match reply {
        RespValue::Error(e) => &e.message,
        other => panic!("Expected an error reply, got {:?}", other),
    }
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}

/// Create a temporary directory for test data.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}
