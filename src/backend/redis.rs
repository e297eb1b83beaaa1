//! Pooled TCP forwarder to a RESP store.
//!
//! Connections are opened lazily and kept in an idle list. A semaphore caps
//! the number of connections in use at `pool_size`, so a burst of commands
//! queues for a connection instead of opening more. A connection that fails
//! mid-request is discarded rather than returned to the pool.

use super::{Backend, BackendFuture};
use crate::core::error::{GatewayError, GatewayResult};
use crate::protocol::{Command, FrameReader, ReadOutcome, RespValue};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

struct PooledConn {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl PooledConn {
    async fn request(&mut self, cmd: &Command) -> GatewayResult<RespValue> {
        self.writer.write_all(&cmd.to_bytes()).await?;
        match self.reader.read_frame(None).await {
            ReadOutcome::Frame(value) => Ok(value),
            ReadOutcome::Closed => Err(GatewayError::backend("connection closed by store")),
            ReadOutcome::Invalid(e) => Err(GatewayError::backend(format!("bad reply: {}", e))),
            ReadOutcome::Failed(e) => Err(e.into()),
            ReadOutcome::Timeout => Err(GatewayError::backend("reply timed out")),
        }
    }
}

/// Backend that forwards commands to a RESP store over TCP.
pub struct RedisBackend {
    address: String,
    connect_timeout: Duration,
    permits: Semaphore,
    idle: Mutex<Vec<PooledConn>>,
}

impl RedisBackend {
    /// Create a backend for the store at `address`. No connection is opened
    /// until the first command.
    pub fn new(address: impl Into<String>, pool_size: usize, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            permits: Semaphore::new(pool_size.max(1)),
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Store address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Number of idle pooled connections.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    async fn connect(&self) -> GatewayResult<PooledConn> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| GatewayError::backend(format!("connect to {} timed out", self.address)))?
            .map_err(|e| GatewayError::backend(format!("connect to {}: {}", self.address, e)))?;
        stream.set_nodelay(true)?;

        tracing::debug!(address = %self.address, "backend connection opened");

        let (read, writer) = stream.into_split();
        Ok(PooledConn {
            reader: FrameReader::new(read),
            writer,
        })
    }

    async fn forward(&self, cmd: Command) -> GatewayResult<RespValue> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GatewayError::backend("connection pool closed"))?;

        let pooled = self.idle.lock().pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => self.connect().await?,
        };

        match conn.request(&cmd).await {
            Ok(reply) => {
                self.idle.lock().push(conn);
                Ok(reply)
            }
            Err(e) => {
                tracing::warn!(address = %self.address, verb = %cmd.verb(), error = %e, "backend request failed");
                Err(e)
            }
        }
    }
}

impl Backend for RedisBackend {
    fn execute(&self, cmd: Command) -> BackendFuture<'_> {
        Box::pin(self.forward(cmd))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
