//! Main runtime orchestration.
//!
//! The runtime wires the configured components together and owns their
//! lifecycle:
//! - Start order: stream binding → committer → backend → gateway handlers → listener
//! - Shutdown order: listener → sessions → committer (drain) → binding release

use crate::backend::{self, Backend};
use crate::core::config::Config;
use crate::core::error::GatewayResult;
use crate::gateway::{Gateway, GatewayOptions, StrictResolver};
use crate::proxy;
use crate::stream::{Committer, StreamBinding, StreamOptions};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Component health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Component is starting.
    Starting,
    /// Component is healthy and operational.
    Healthy,
    /// Component has failed.
    Failed,
    /// Component is stopping.
    Stopping,
    /// Component has stopped.
    Stopped,
}

/// Health status aggregated from all components.
#[derive(Debug, Clone)]
pub struct RuntimeHealth {
    /// Log binding and committer.
    pub stream: ComponentHealth,
    /// Backend store.
    pub backend: ComponentHealth,
    /// Client listener.
    pub gateway: ComponentHealth,
}

impl Default for RuntimeHealth {
    fn default() -> Self {
        Self {
            stream: ComponentHealth::Starting,
            backend: ComponentHealth::Starting,
            gateway: ComponentHealth::Starting,
        }
    }
}

impl RuntimeHealth {
    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.stream == ComponentHealth::Healthy
            && self.backend == ComponentHealth::Healthy
            && self.gateway == ComponentHealth::Healthy
    }

    /// Check if the runtime is alive (not failed).
    pub fn is_alive(&self) -> bool {
        ![self.stream, self.backend, self.gateway].contains(&ComponentHealth::Failed)
    }
}

/// Ledgate runtime holding all component handles.
pub struct Runtime {
    config: Arc<Config>,

    gateway: Option<Arc<Gateway>>,
    committer: Option<Arc<Committer>>,

    listen_handle: Option<JoinHandle<GatewayResult<()>>>,
    errors_handle: Option<JoinHandle<()>>,

    health: RuntimeHealth,
    running: Arc<AtomicBool>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            gateway: None,
            committer: None,
            listen_handle: None,
            errors_handle: None,
            health: RuntimeHealth::default(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the current health status.
    pub fn health(&self) -> &RuntimeHealth {
        &self.health
    }

    /// Check if the runtime is ready to serve requests.
    pub fn is_ready(&self) -> bool {
        self.health.is_ready()
    }

    /// Check if the runtime is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Address the gateway is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.gateway.as_ref().map(|g| g.local_addr())
    }

    /// The gateway, once started.
    pub fn gateway(&self) -> Option<&Arc<Gateway>> {
        self.gateway.as_ref()
    }

    /// Get a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Initialize and start all runtime components.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(
            listen = %self.config.gateway.listen,
            backend = %self.config.backend.kind,
            topic = %self.config.stream.topic,
            "starting ledgate runtime"
        );

        let committer = match self.init_stream() {
            Ok(committer) => committer,
            Err(e) => {
                self.health.stream = ComponentHealth::Failed;
                return Err(e);
            }
        };

        let backend = match backend::from_config(&self.config.backend) {
            Ok(backend) => backend,
            Err(e) => {
                self.health.backend = ComponentHealth::Failed;
                committer.close().await;
                return Err(e.context("failed to initialize backend"));
            }
        };
        self.health.backend = ComponentHealth::Healthy;
        tracing::info!(backend = %backend.name(), "backend initialized");

        if let Err(e) = self.start_gateway(Arc::clone(&committer), backend).await {
            self.health.gateway = ComponentHealth::Failed;
            committer.close().await;
            return Err(e);
        }

        self.committer = Some(committer);
        self.running.store(true, Ordering::Release);
        tracing::info!("ledgate runtime started");

        Ok(())
    }

    /// Bind the log stream and start the committer.
    fn init_stream(&mut self) -> Result<Arc<Committer>> {
        tracing::debug!("initializing stream binding");

        let section = &self.config.stream;
        let mut options = StreamOptions::new(
            section.addresses.clone(),
            section.client_id.clone(),
            section.topic.clone(),
        );
        options.channel_capacity = section.channel_capacity;
        options.segment_bytes = section.segment_bytes;

        let binding = StreamBinding::bind(options).context("failed to bind log stream")?;
        let committer =
            Arc::new(Committer::from_binding(&binding).context("failed to start committer")?);

        let topic = committer.topic().to_string();
        committer.error_listener(|mut errors| {
            self.errors_handle = Some(tokio::spawn(async move {
                while let Some(failure) = errors.recv().await {
                    tracing::warn!(
                        topic = %topic,
                        key = failure.record.key,
                        error = %failure.error,
                        "log delivery failed"
                    );
                }
            }));
        });

        self.health.stream = ComponentHealth::Healthy;
        Ok(committer)
    }

    /// Register handlers and start accepting connections.
    async fn start_gateway(
        &mut self,
        committer: Arc<Committer>,
        backend: Arc<dyn Backend>,
    ) -> Result<()> {
        tracing::debug!("starting gateway");

        let options = GatewayOptions {
            pipeline_depth: self.config.gateway.pipeline_depth,
        };
        let gateway = Gateway::bind(&self.config.gateway.listen, options)
            .await
            .with_context(|| format!("failed to bind {}", self.config.gateway.listen))?;
        let gateway = Arc::new(gateway);

        if self.config.gateway.strict_resolver {
            gateway.register_resolver(StrictResolver);
        }
        proxy::register(
            &gateway,
            committer,
            backend,
            self.config.gateway.reject_blacklisted,
        );

        self.listen_handle = Some(tokio::spawn(Arc::clone(&gateway).listen()));
        self.health.gateway = ComponentHealth::Healthy;
        tracing::info!(addr = %gateway.local_addr(), "gateway started");

        self.gateway = Some(gateway);
        Ok(())
    }

    /// Trigger graceful shutdown.
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the runtime until SIGINT or [`shutdown`](Self::shutdown).
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received (SIGINT)");
            }
            _ = async {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            } => {
                tracing::info!("shutdown requested by component");
            }
        }

        self.stop().await
    }

    /// Stop all runtime components in reverse start order.
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!("stopping ledgate runtime");
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);

        self.stop_gateway().await;
        self.stop_stream().await;

        tracing::info!("ledgate runtime stopped");
        Ok(())
    }

    async fn stop_gateway(&mut self) {
        tracing::debug!("stopping gateway");
        self.health.gateway = ComponentHealth::Stopping;

        if let Some(gateway) = self.gateway.as_ref() {
            gateway.shutdown();
        }

        // A pending accept is not woken by close; drop the listener instead.
        if let Some(handle) = self.listen_handle.take() {
            handle.abort();
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "gateway stopped with error"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!(error = %e, "gateway task panicked"),
            }
        }

        self.health.gateway = ComponentHealth::Stopped;
        self.health.backend = ComponentHealth::Stopped;
    }

    async fn stop_stream(&mut self) {
        tracing::debug!("stopping committer");
        self.health.stream = ComponentHealth::Stopping;

        if let Some(committer) = self.committer.take() {
            committer.close().await;
        }
        if let Some(handle) = self.errors_handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "delivery error task failed");
            }
        }

        self.health.stream = ComponentHealth::Stopped;
    }
}
