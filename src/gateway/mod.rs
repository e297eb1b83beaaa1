//! Protocol gateway.
//!
//! The gateway accepts client connections, decodes RESP commands, classifies
//! them through the active resolver and dispatches them to the handler
//! registered for that classification:
//!
//! ```text
//!   ┌──────────┐   accept   ┌─────────┐  frame  ┌──────────┐  class  ┌──────────┐
//!   │ listener │──────────►│ session │───────►│ resolver │───────►│ handler  │
//!   └──────────┘  (1 task   └─────────┘         └──────────┘         └──────────┘
//!                 per conn)      ▲                                        │
//!                                └──────── ordered replies ◄──────────────┘
//! ```
//!
//! - [`classifier`] - verb tables and resolvers
//! - [`handler`] - handler trait and registry
//! - [`session`] - per-connection read/dispatch loop
//! - [`ordering`] - ordered-completion buffer for pipelined replies
//!
//! # Shutdown
//!
//! [`Gateway::close`] sets a flag the accept loop checks once per iteration.
//! A pending accept is not interrupted: at most one more connection is
//! accepted after `close`, and it is dropped immediately. Open sessions keep
//! running. [`Gateway::shutdown`] additionally signals sessions, which end at
//! their next one-second read deadline.

pub mod classifier;
pub mod handler;
pub mod ordering;
pub mod session;

pub use classifier::{
    classify, default_resolver, strict_resolver, Classification, DefaultResolver, Resolver,
    StrictResolver,
};
pub use handler::{Handler, HandlerContext, HandlerFuture, HandlerRegistry};
pub use ordering::OrderedReplies;
pub use session::SessionEnd;

use crate::core::error::{GatewayError, GatewayResult};
use parking_lot::{Mutex, RwLock};
use session::Session;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Session read deadline. Also bounds how long an idle session takes to
/// observe a shutdown signal.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a failed accept before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Gateway tuning.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Maximum in-flight commands per connection.
    pub pipeline_depth: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self { pipeline_depth: 64 }
    }
}

/// Gateway counters.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,
    /// Currently open sessions.
    pub connections_active: AtomicU64,
    /// Commands handed to a handler.
    pub commands_dispatched: AtomicU64,
    /// Error replies sent.
    pub errors_replied: AtomicU64,
}

impl GatewayMetrics {
    /// Record a new session.
    pub fn connection_accepted(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session end.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a dispatch.
    pub fn command_dispatched(&self) {
        self.commands_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error reply.
    pub fn error_replied(&self) {
        self.errors_replied.fetch_add(1, Ordering::Relaxed);
    }

    /// Get active session count.
    pub fn active_connections(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }
}

/// RESP gateway bound to a listener.
pub struct Gateway {
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    registry: HandlerRegistry,
    resolver: RwLock<Option<Arc<dyn Resolver>>>,
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    metrics: Arc<GatewayMetrics>,
    next_connection: AtomicU64,
    options: GatewayOptions,
}

impl Gateway {
    /// Create a gateway on an already bound listener, with the default
    /// resolver and no handlers.
    pub fn new(listener: TcpListener) -> GatewayResult<Self> {
        Self::with_options(listener, GatewayOptions::default())
    }

    /// Create a gateway with explicit options.
    pub fn with_options(listener: TcpListener, options: GatewayOptions) -> GatewayResult<Self> {
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            registry: HandlerRegistry::new(),
            resolver: RwLock::new(Some(default_resolver())),
            closed: AtomicBool::new(false),
            shutdown_tx,
            metrics: Arc::new(GatewayMetrics::default()),
            next_connection: AtomicU64::new(1),
            options,
        })
    }

    /// Bind a listener on `addr` and create a gateway on it.
    pub async fn bind(addr: &str, options: GatewayOptions) -> GatewayResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::with_options(listener, options)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Gateway options.
    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Gateway counters.
    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Register the handler for a classification, replacing any previous one.
    pub fn register_handler<H>(&self, class: Classification, handler: H) -> Option<Arc<dyn Handler>>
    where
        H: Handler + 'static,
    {
        tracing::debug!(class = %class, "handler registered");
        self.registry.register(class, Arc::new(handler))
    }

    /// Install the active resolver, replacing the current one.
    pub fn register_resolver<R>(&self, resolver: R)
    where
        R: Resolver + 'static,
    {
        *self.resolver.write() = Some(Arc::new(resolver));
    }

    /// Remove the active resolver. Sessions then reply `ResolverUnset` and end.
    pub fn clear_resolver(&self) {
        *self.resolver.write() = None;
    }

    /// Active resolver.
    pub fn resolver(&self) -> Option<Arc<dyn Resolver>> {
        self.resolver.read().clone()
    }

    /// Accept connections until [`close`](Self::close) takes effect.
    ///
    /// Each connection runs in its own task. Fails if the gateway is already
    /// listening or has listened before.
    pub async fn listen(self: Arc<Self>) -> GatewayResult<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or_else(|| GatewayError::internal("gateway listener already in use"))?;

        tracing::info!(addr = %self.local_addr, "gateway listening");

        loop {
            if self.is_closed() {
                break;
            }

            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if self.is_closed() {
                tracing::debug!(peer = %peer, "dropping connection accepted after close");
                drop(stream);
                break;
            }

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(peer = %peer, error = %e, "set_nodelay failed");
            }

            let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
            self.metrics.connection_accepted();
            tracing::debug!(conn = %id, peer = %peer, "connection accepted");

            let gateway = Arc::clone(&self);
            tokio::spawn(async move {
                let metrics = Arc::clone(gateway.metrics());
                Session::new(id, peer, gateway).run(stream).await;
                metrics.connection_closed();
            });
        }

        tracing::info!(addr = %self.local_addr, "gateway stopped listening");
        Ok(())
    }

    /// Stop accepting connections on the accept loop's next iteration.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(addr = %self.local_addr, "gateway closing");
        }
    }

    /// Close the gateway and signal open sessions to end.
    pub fn shutdown(&self) {
        self.close();
        self.shutdown_tx.send_replace(true);
    }

    /// Check if [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }

    #[test]
    fn test_metrics() {
        let metrics = GatewayMetrics::default();
        metrics.connection_accepted();
        metrics.connection_accepted();
        metrics.connection_closed();
        metrics.command_dispatched();
        metrics.error_replied();

        assert_eq!(metrics.connections_total.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.active_connections(), 1);
        assert_eq!(metrics.commands_dispatched.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.errors_replied.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_new_gateway_has_default_resolver() {
        let gateway = Gateway::bind("127.0.0.1:0", GatewayOptions::default())
            .await
            .unwrap();
        assert_ne!(gateway.local_addr().port(), 0);
        assert!(gateway.handlers().is_empty());

        let resolver = gateway.resolver().unwrap();
        assert_eq!(resolver.resolve("GET").unwrap(), Classification::Read);

        gateway.clear_resolver();
        assert!(gateway.resolver().is_none());
    }

    #[tokio::test]
    async fn test_listen_twice_fails() {
        let gateway = Arc::new(
            Gateway::bind("127.0.0.1:0", GatewayOptions::default())
                .await
                .unwrap(),
        );
        gateway.close();

        // Closed before the first iteration: returns without accepting.
        Arc::clone(&gateway).listen().await.unwrap();
        assert!(Arc::clone(&gateway).listen().await.is_err());
    }
}
