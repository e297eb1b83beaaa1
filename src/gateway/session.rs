//! Connection session.
//!
//! One session runs per accepted connection:
//!
//! ```text
//!   Reading ──frame──► Classifying ──class──► Dispatching ──spawn──► Reading
//!      │                    │                      │
//!      │ EOF / io error     │ resolver error       │ no handler: HandlerUnset
//!      ▼                    ▼                      ▼
//!    Closed ◄────────── reply + Closed          reply, keep reading
//! ```
//!
//! Each command gets a sequence number. Handlers run concurrently with the
//! read loop; their replies go through an [`OrderedReplies`] buffer in the
//! writer task, so the client always sees replies in request order. A
//! handler that panics still answers its sequence number with an internal
//! error, so later replies are never held back.

use super::classifier::Classification;
use super::handler::HandlerContext;
use super::ordering::OrderedReplies;
use super::{ConnectionId, Gateway, READ_TIMEOUT};
use crate::core::error::GatewayError;
use crate::protocol::{Command, FrameReader, ReadOutcome, RespCodec, RespValue};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};

type Reply = (u64, RespValue);

/// How long a shutting-down session waits for in-flight replies.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(1);

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client closed the connection.
    ClientClosed,
    /// Socket read failed.
    ReadError,
    /// Client sent bytes that are not RESP.
    ProtocolError,
    /// Resolver was missing or refused a verb.
    ResolverError,
    /// Gateway shutdown was signalled.
    Shutdown,
}

/// Per-connection state.
pub(crate) struct Session {
    id: ConnectionId,
    peer: SocketAddr,
    gateway: Arc<Gateway>,
    next_sequence: u64,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, peer: SocketAddr, gateway: Arc<Gateway>) -> Self {
        Self {
            id,
            peer,
            gateway,
            next_sequence: 0,
        }
    }

    /// Serve the connection until it closes. The socket is closed on every
    /// exit path once in-flight replies have been flushed.
    pub(crate) async fn run(mut self, stream: TcpStream) -> SessionEnd {
        let (read, write) = stream.into_split();
        let mut reader = FrameReader::new(read);
        let (tx, rx) = mpsc::unbounded_channel::<Reply>();
        let mut writer = tokio::spawn(write_replies(write, rx));

        let permits = Arc::new(Semaphore::new(self.gateway.options().pipeline_depth.max(1)));
        let mut shutdown = self.gateway.subscribe_shutdown();

        let end = loop {
            if *shutdown.borrow_and_update() {
                break SessionEnd::Shutdown;
            }

            // Stop reading while the pipeline is full.
            let permit = tokio::select! {
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break SessionEnd::Shutdown,
                },
                _ = shutdown.changed() => break SessionEnd::Shutdown,
            };

            let frame = match reader.read_frame(Some(READ_TIMEOUT)).await {
                ReadOutcome::Frame(frame) => frame,
                ReadOutcome::Timeout => continue,
                ReadOutcome::Closed => break SessionEnd::ClientClosed,
                ReadOutcome::Failed(e) => {
                    tracing::debug!(conn = %self.id, error = %e, "session read failed");
                    break SessionEnd::ReadError;
                }
                ReadOutcome::Invalid(reason) => {
                    let seq = self.sequence();
                    self.reply_error(&tx, seq, GatewayError::bad_command(reason));
                    break SessionEnd::ProtocolError;
                }
            };

            let seq = self.sequence();
            let cmd = match Command::from_frame(frame) {
                Ok(cmd) => cmd,
                Err(e) => {
                    // The frame was consumed whole, so the stream is still aligned.
                    self.reply_error(&tx, seq, e);
                    continue;
                }
            };

            let class = match self.resolve(&cmd) {
                Ok(class) => class,
                Err(e) => {
                    tracing::debug!(conn = %self.id, verb = %cmd.verb(), error = %e, "resolver refused command");
                    self.reply_error(&tx, seq, e);
                    break SessionEnd::ResolverError;
                }
            };

            let Some(handler) = self.gateway.handlers().get(class) else {
                self.reply_error(&tx, seq, GatewayError::HandlerUnset);
                continue;
            };

            self.gateway.metrics().command_dispatched();
            let ctx = HandlerContext {
                connection_id: self.id,
                peer: self.peer,
                sequence: seq,
                classification: class,
            };
            let tx = tx.clone();
            let metrics = Arc::clone(self.gateway.metrics());
            let conn = self.id;
            tokio::spawn(async move {
                // The handler runs in its own task so a panic still yields a
                // reply for its sequence number.
                let reply = match tokio::spawn(async move { handler.handle(ctx, cmd).await }).await
                {
                    Ok(Ok(reply)) => reply,
                    Ok(Err(e)) => {
                        metrics.error_replied();
                        RespValue::from(e)
                    }
                    Err(e) => {
                        tracing::warn!(conn = %conn, seq, error = %e, "handler task failed");
                        metrics.error_replied();
                        let message = if e.is_panic() {
                            "handler panicked"
                        } else {
                            "handler cancelled"
                        };
                        RespValue::from(GatewayError::internal(message))
                    }
                };
                let _ = tx.send((seq, reply));
                drop(permit);
            });
        };

        drop(tx);
        let written = if end == SessionEnd::Shutdown {
            // Handlers that never finish keep the writer alive; give them a
            // bounded window, then drop the socket.
            match tokio::time::timeout(SHUTDOWN_DRAIN, &mut writer).await {
                Ok(result) => Some(result),
                Err(_) => {
                    tracing::debug!(conn = %self.id, "in-flight replies abandoned at shutdown");
                    writer.abort();
                    None
                }
            }
        } else {
            Some((&mut writer).await)
        };
        match written {
            Some(Ok(Ok(()))) | None => {}
            Some(Ok(Err(e))) => {
                tracing::debug!(conn = %self.id, error = %e, "session write failed")
            }
            Some(Err(e)) => tracing::warn!(conn = %self.id, error = %e, "session writer panicked"),
        }

        tracing::debug!(conn = %self.id, peer = %self.peer, reason = ?end, "session closed");
        end
    }

    fn sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn resolve(&self, cmd: &Command) -> Result<Classification, GatewayError> {
        let resolver = self.gateway.resolver().ok_or(GatewayError::ResolverUnset)?;
        resolver.resolve(cmd.verb())
    }

    fn reply_error(&self, tx: &mpsc::UnboundedSender<Reply>, seq: u64, err: GatewayError) {
        self.gateway.metrics().error_replied();
        let _ = tx.send((seq, RespValue::from(err)));
    }
}

/// Writer task: flush replies in sequence order until every sender is gone.
async fn write_replies(
    mut write: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Reply>,
) -> std::io::Result<()> {
    let codec = RespCodec::new();
    let mut ordered = OrderedReplies::new();
    let mut buf = Vec::with_capacity(256);

    while let Some((seq, reply)) = rx.recv().await {
        for ready in ordered.complete(seq, reply) {
            buf.extend_from_slice(&codec.encode(&ready));
        }
        // Coalesce replies that are already queued.
        while let Ok((seq, reply)) = rx.try_recv() {
            for ready in ordered.complete(seq, reply) {
                buf.extend_from_slice(&codec.encode(&ready));
            }
        }
        if !buf.is_empty() {
            write.write_all(&buf).await?;
            buf.clear();
        }
    }

    write.shutdown().await
}
