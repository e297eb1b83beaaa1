//! Configuration parsing and validation.
//!
//! Configuration is loaded from a TOML file with CLI overrides. Every section
//! has defaults, so an empty file describes a gateway on `127.0.0.1:16379`
//! in front of a local Redis, committing writes to an in-process log.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Client-facing listener.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Backend store.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Ordered write log.
    #[serde(default)]
    pub stream: StreamConfigSection,

    /// Logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Client-facing listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind address (e.g., "127.0.0.1:16379").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Maximum in-flight commands per connection.
    #[serde(default = "default_pipeline_depth")]
    pub pipeline_depth: usize,

    /// Resolve blacklisted verbs to an error instead of dispatching them.
    #[serde(default)]
    pub strict_resolver: bool,

    /// Register a handler that refuses blacklisted verbs in-protocol.
    #[serde(default = "default_true")]
    pub reject_blacklisted: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            pipeline_depth: default_pipeline_depth(),
            strict_resolver: false,
            reject_blacklisted: true,
        }
    }
}

/// Backend store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend kind: "redis" or "memory".
    #[serde(default = "default_backend_kind")]
    pub kind: String,

    /// Store address for the redis backend.
    #[serde(default = "default_backend_address")]
    pub address: String,

    /// Maximum pooled connections to the store.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            address: default_backend_address(),
            pool_size: default_pool_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Ordered write log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfigSection {
    /// Log addresses (`mem://<name>` or `file://<dir>`).
    #[serde(default = "default_stream_addresses")]
    pub addresses: Vec<String>,

    /// Client identifier presented to the log.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic write commands are appended to.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Producer queue capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Segment rollover size for the file log, in bytes.
    #[serde(default = "default_segment_bytes")]
    pub segment_bytes: u64,
}

impl Default for StreamConfigSection {
    fn default() -> Self {
        Self {
            addresses: default_stream_addresses(),
            client_id: default_client_id(),
            topic: default_topic(),
            channel_capacity: default_channel_capacity(),
            segment_bytes: default_segment_bytes(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_listen() -> String {
    "127.0.0.1:16379".to_string()
}

fn default_pipeline_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_backend_kind() -> String {
    "redis".to_string()
}

fn default_backend_address() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    10
}

fn default_connect_timeout_ms() -> u64 {
    1_000
}

fn default_stream_addresses() -> Vec<String> {
    vec!["mem://default".to_string()]
}

fn default_client_id() -> String {
    "ledgate".to_string()
}

fn default_topic() -> String {
    "ledgate-writes".to_string()
}

fn default_channel_capacity() -> usize {
    1_024
}

fn default_segment_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).with_context(|| "failed to serialize config")
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref listen) = overrides.listen {
            self.gateway.listen = listen.clone();
        }
        if let Some(ref kind) = overrides.backend_kind {
            self.backend.kind = kind.clone();
        }
        if let Some(ref address) = overrides.backend_address {
            self.backend.address = address.clone();
        }
        if !overrides.stream_addresses.is_empty() {
            self.stream.addresses = overrides.stream_addresses.clone();
        }
        if let Some(ref topic) = overrides.topic {
            self.stream.topic = topic.clone();
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_gateway()?;
        self.validate_backend()?;
        self.validate_stream()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_gateway(&self) -> Result<()> {
        self.gateway
            .listen
            .parse::<SocketAddr>()
            .with_context(|| format!("gateway.listen is not a socket address: {}", self.gateway.listen))?;

        if self.gateway.pipeline_depth == 0 {
            anyhow::bail!("gateway.pipeline_depth must be > 0");
        }

        Ok(())
    }

    fn validate_backend(&self) -> Result<()> {
        match self.backend.kind.as_str() {
            "redis" => {
                if self.backend.address.is_empty() {
                    anyhow::bail!("backend.address required for redis backend");
                }
                if self.backend.pool_size == 0 {
                    anyhow::bail!("backend.pool_size must be > 0");
                }
            }
            "memory" => {}
            other => {
                anyhow::bail!("backend.kind must be 'redis' or 'memory', got: {}", other);
            }
        }
        Ok(())
    }

    fn validate_stream(&self) -> Result<()> {
        if self.stream.addresses.is_empty() {
            anyhow::bail!("stream.addresses must not be empty");
        }
        for address in &self.stream.addresses {
            if !address.starts_with("mem://") && !address.starts_with("file://") {
                anyhow::bail!(
                    "stream.addresses entries must use mem:// or file://, got: {}",
                    address
                );
            }
        }
        if self.stream.topic.is_empty() {
            anyhow::bail!("stream.topic must not be empty");
        }
        if self.stream.client_id.is_empty() {
            anyhow::bail!("stream.client_id must not be empty");
        }
        if self.stream.channel_capacity == 0 {
            anyhow::bail!("stream.channel_capacity must be > 0");
        }
        if self.stream.segment_bytes == 0 {
            anyhow::bail!("stream.segment_bytes must be > 0");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override listen address.
    pub listen: Option<String>,
    /// Override backend kind.
    pub backend_kind: Option<String>,
    /// Override backend address.
    pub backend_address: Option<String>,
    /// Override log addresses.
    pub stream_addresses: Vec<String>,
    /// Override topic.
    pub topic: Option<String>,
}
