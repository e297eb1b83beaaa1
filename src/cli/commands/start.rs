//! Start command implementation.

use crate::core::config::{Config, ConfigOverrides};
use crate::core::runtime::Runtime;
use anyhow::{Context, Result};
use clap::Args;
use std::path::Path;

/// Config file used when `--config` is not given. Missing is not an error.
pub const DEFAULT_CONFIG_PATH: &str = "config/ledgate.toml";

/// Start the gateway.
#[derive(Args, Debug, Default)]
pub struct StartArgs {
    /// Override the client listen address.
    #[arg(long)]
    pub listen: Option<String>,

    /// Override the backend kind (redis, memory).
    #[arg(long)]
    pub backend: Option<String>,

    /// Override the backend store address.
    #[arg(long)]
    pub backend_address: Option<String>,

    /// Override the log addresses (repeatable).
    #[arg(long = "stream-address")]
    pub stream_address: Vec<String>,

    /// Override the topic writes are appended to.
    #[arg(long)]
    pub topic: Option<String>,
}

impl StartArgs {
    fn overrides(&self, log_level: Option<String>) -> ConfigOverrides {
        ConfigOverrides {
            log_level,
            listen: self.listen.clone(),
            backend_kind: self.backend.clone(),
            backend_address: self.backend_address.clone(),
            stream_addresses: self.stream_address.clone(),
            topic: self.topic.clone(),
        }
    }
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` takes precedence over the configured level.
#[cfg(feature = "telemetry")]
fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(_level: &str) {}

/// Load the configuration at `path`, or at [`DEFAULT_CONFIG_PATH`] if it
/// exists, falling back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {:?}", path)),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                Config::from_file(default_path)
                    .with_context(|| format!("failed to load config from {:?}", default_path))
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// Run the start command.
pub async fn run_start(
    config_path: Option<&Path>,
    log_level: Option<String>,
    args: StartArgs,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.apply_overrides(&args.overrides(log_level));

    init_tracing(&config.telemetry.log_level);

    let mut runtime = Runtime::new(config)?;
    runtime.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_from_args() {
        let args = StartArgs {
            backend: Some("memory".to_string()),
            topic: Some("t".to_string()),
            ..Default::default()
        };
        let mut config = Config::default();
        config.apply_overrides(&args.overrides(Some("warn".to_string())));

        assert_eq!(config.backend.kind, "memory");
        assert_eq!(config.stream.topic, "t");
        assert_eq!(config.telemetry.log_level, "warn");
        assert_eq!(config.gateway.listen, "127.0.0.1:16379");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/ledgate.toml"))).is_err());
    }
}
