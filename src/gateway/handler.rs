//! Handler registry.
//!
//! A handler receives one classified command and produces its reply. The
//! registry maps each [`Classification`] to at most one handler and may be
//! changed while sessions are running; a session looks the handler up once
//! per command.

use super::classifier::Classification;
use super::ConnectionId;
use crate::core::error::GatewayResult;
use crate::protocol::{Command, RespValue};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

/// Per-command context passed to handlers.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Connection the command arrived on.
    pub connection_id: ConnectionId,
    /// Client address.
    pub peer: SocketAddr,
    /// Sequence number of the command within its connection.
    pub sequence: u64,
    /// Resolved classification.
    pub classification: Classification,
}

/// Future returned by [`Handler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = GatewayResult<RespValue>> + Send>>;

/// Produces the reply for a classified command.
///
/// An `Err` is sent to the client as an error reply; the session continues.
pub trait Handler: Send + Sync {
    /// Handle one command.
    fn handle(&self, ctx: HandlerContext, cmd: Command) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(HandlerContext, Command) -> Fut + Send + Sync,
    Fut: Future<Output = GatewayResult<RespValue>> + Send + 'static,
{
    fn handle(&self, ctx: HandlerContext, cmd: Command) -> HandlerFuture {
        Box::pin(self(ctx, cmd))
    }
}

/// Classification → handler map.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<Classification, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaces.
    pub fn register(
        &self,
        class: Classification,
        handler: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        self.handlers.write().insert(class, handler)
    }

    /// Remove the handler for a classification.
    pub fn unregister(&self, class: Classification) -> Option<Arc<dyn Handler>> {
        self.handlers.write().remove(&class)
    }

    /// Look up the handler for a classification.
    pub fn get(&self, class: Classification) -> Option<Arc<dyn Handler>> {
        self.handlers.read().get(&class).cloned()
    }

    /// Check if a handler is registered.
    pub fn contains(&self, class: Classification) -> bool {
        self.handlers.read().contains_key(&class)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
