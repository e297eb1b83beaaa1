//! Proxy handlers.
//!
//! Wires the gateway to the commit layer and the backend store:
//!
//! - reads go straight to the backend
//! - writes are appended to the log first; only once the log acknowledges
//!   the record is the command applied to the backend. Commit and apply run
//!   under one lock so the backend sees writes in log order
//! - blacklisted commands are refused in-protocol

use crate::backend::Backend;
use crate::core::error::GatewayError;
use crate::gateway::{Classification, Gateway, Handler, HandlerContext, HandlerFuture};
use crate::protocol::Command;
use crate::stream::Committer;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Forwards commands to the backend.
pub struct ReadHandler {
    backend: Arc<dyn Backend>,
}

impl ReadHandler {
    /// Create a read handler.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

impl Handler for ReadHandler {
    fn handle(&self, _ctx: HandlerContext, cmd: Command) -> HandlerFuture {
        let backend = Arc::clone(&self.backend);
        Box::pin(async move { backend.execute(cmd).await })
    }
}

/// Commits commands to the log, then applies them to the backend.
pub struct WriteHandler {
    committer: Arc<Committer>,
    backend: Arc<dyn Backend>,
    apply_lock: Arc<Mutex<()>>,
}

impl WriteHandler {
    /// Create a write handler.
    pub fn new(committer: Arc<Committer>, backend: Arc<dyn Backend>) -> Self {
        Self {
            committer,
            backend,
            apply_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl Handler for WriteHandler {
    fn handle(&self, ctx: HandlerContext, cmd: Command) -> HandlerFuture {
        let committer = Arc::clone(&self.committer);
        let backend = Arc::clone(&self.backend);
        let apply_lock = Arc::clone(&self.apply_lock);
        Box::pin(async move {
            // Held from append to apply: log order is apply order.
            let _guard = apply_lock.lock().await;

            let metadata = json!({
                "connection": ctx.connection_id.0,
                "peer": ctx.peer.to_string(),
                "sequence": ctx.sequence,
            });

            let receipt = committer.write(&cmd, metadata).await?;
            let ack = receipt.wait().await?;
            tracing::trace!(
                conn = %ctx.connection_id,
                topic = %ack.topic,
                offset = ack.offset,
                verb = %cmd.verb(),
                "write committed"
            );

            backend.execute(cmd).await
        })
    }
}

/// Refuses every command with `Blacklisted`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectHandler;

impl Handler for RejectHandler {
    fn handle(&self, _ctx: HandlerContext, _cmd: Command) -> HandlerFuture {
        Box::pin(async { Err(GatewayError::Blacklisted) })
    }
}

/// Register the proxy handlers on a gateway.
pub fn register(
    gateway: &Gateway,
    committer: Arc<Committer>,
    backend: Arc<dyn Backend>,
    reject_blacklisted: bool,
) {
    gateway.register_handler(Classification::Read, ReadHandler::new(Arc::clone(&backend)));
    gateway.register_handler(Classification::Write, WriteHandler::new(committer, backend));
    if reject_blacklisted {
        gateway.register_handler(Classification::Blacklisted, RejectHandler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendFuture, MemoryBackend};
    use crate::gateway::ConnectionId;
    use crate::protocol::RespValue;
    use crate::stream::{MemoryLog, StreamBinding, StreamOptions};

    fn ctx(class: Classification) -> HandlerContext {
        HandlerContext {
            connection_id: ConnectionId(3),
            peer: "127.0.0.1:5555".parse().unwrap(),
            sequence: 9,
            classification: class,
        }
    }

    fn committer(name: &str) -> Arc<Committer> {
        let binding = StreamBinding::bind(StreamOptions::new(
            vec![format!("mem://{}", name)],
            "proxy-test",
            "writes",
        ))
        .unwrap();
        Arc::new(Committer::from_binding(&binding).unwrap())
    }

    #[tokio::test]
    async fn test_write_commits_before_apply() {
        let backend = Arc::new(MemoryBackend::new());
        let handler = WriteHandler::new(committer("proxy-write"), backend.clone());

        let cmd = Command::from_parts(&["SET", "k", "v"]).unwrap();
        let reply = handler.handle(ctx(Classification::Write), cmd.clone()).await.unwrap();
        assert_eq!(reply, RespValue::ok());
        assert!(backend.get(b"k").is_some());

        let records = MemoryLog::open("proxy-write").records("writes");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, cmd.to_bytes());
        assert_eq!(records[0].metadata["connection"], 3);
        assert_eq!(records[0].metadata["sequence"], 9);
    }

    /// Stalls writes whose value is "1".
    struct SlowFirst(MemoryBackend);

    impl Backend for SlowFirst {
        fn execute(&self, cmd: Command) -> BackendFuture<'_> {
            Box::pin(async move {
                if cmd.arg_str(1) == Some("1") {
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                }
                self.0.execute(cmd).await
            })
        }

        fn name(&self) -> &'static str {
            "slow-first"
        }
    }

    #[tokio::test]
    async fn test_concurrent_writes_apply_in_log_order() {
        let backend = Arc::new(SlowFirst(MemoryBackend::new()));
        let handler = WriteHandler::new(committer("proxy-order"), backend.clone());

        let first = handler.handle(
            ctx(Classification::Write),
            Command::from_parts(&["SET", "k", "1"]).unwrap(),
        );
        let second = handler.handle(
            ctx(Classification::Write),
            Command::from_parts(&["SET", "k", "2"]).unwrap(),
        );
        let (a, b) = tokio::join!(first, second);
        assert_eq!(a.unwrap(), RespValue::ok());
        assert_eq!(b.unwrap(), RespValue::ok());

        let records = MemoryLog::open("proxy-order").records("writes");
        let logged: Vec<_> = records.iter().map(|r| r.value.clone()).collect();
        assert_eq!(
            logged,
            vec![
                Command::from_parts(&["SET", "k", "1"]).unwrap().to_bytes(),
                Command::from_parts(&["SET", "k", "2"]).unwrap().to_bytes(),
            ]
        );
        assert_eq!(backend.0.get(b"k").as_deref(), Some(&b"2"[..]));
    }

    #[tokio::test]
    async fn test_failed_commit_is_not_applied() {
        let backend = Arc::new(MemoryBackend::new());
        let handler = WriteHandler::new(committer("proxy-fail"), backend.clone());
        MemoryLog::open("proxy-fail").fail_next(1);

        let err = handler
            .handle(
                ctx(Classification::Write),
                Command::from_parts(&["SET", "k", "v"]).unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Commit(_)));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_read_and_reject() {
        let backend = Arc::new(MemoryBackend::new());
        backend.apply(&Command::from_parts(&["SET", "k", "v"]).unwrap());

        let reply = ReadHandler::new(backend)
            .handle(
                ctx(Classification::Read),
                Command::from_parts(&["GET", "k"]).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(reply, RespValue::bulk("v"));

        let err = RejectHandler
            .handle(
                ctx(Classification::Blacklisted),
                Command::from_parts(&["SCRIPT"]).unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Blacklisted));
    }
}
