//! Backend key-value store contract.
//!
//! The gateway never interprets commands itself; it forwards them to a
//! [`Backend`] and relays the reply. Error replies from the store (for
//! example `WRONGTYPE`) are ordinary `Ok` values. `Err` means the store could
//! not be reached or answered garbage.
//!
//! - [`redis`] - pooled TCP forwarder to a RESP store
//! - [`memory`] - in-process store for tests and local runs

pub mod memory;
pub mod redis;

pub use memory::MemoryBackend;
pub use redis::RedisBackend;

use crate::core::config::BackendConfig;
use crate::core::error::GatewayResult;
use crate::protocol::{Command, RespValue};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Future returned by [`Backend::execute`].
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = GatewayResult<RespValue>> + Send + 'a>>;

/// A key-value store that executes RESP commands.
pub trait Backend: Send + Sync {
    /// Execute a command and return the store's reply.
    fn execute(&self, cmd: Command) -> BackendFuture<'_>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Build the backend described by the configuration.
pub fn from_config(config: &BackendConfig) -> anyhow::Result<Arc<dyn Backend>> {
    match config.kind.as_str() {
        "redis" => Ok(Arc::new(RedisBackend::new(
            config.address.clone(),
            config.pool_size,
            Duration::from_millis(config.connect_timeout_ms),
        ))),
        "memory" => Ok(Arc::new(MemoryBackend::new())),
        other => anyhow::bail!("unknown backend kind: {}", other),
    }
}
