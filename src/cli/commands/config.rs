//! Config command implementation.

use super::start::load_config;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the effective configuration, defaults included.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

/// Run the config command.
pub fn run_config(config_path: Option<&Path>, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => validate_config(config_path),
        ConfigCommand::Show { format } => show_config(config_path, &format),
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;

    println!("✓ Configuration is valid");
    println!("  listen:  {}", config.gateway.listen);
    println!(
        "  backend: {} ({})",
        config.backend.kind, config.backend.address
    );
    println!(
        "  stream:  {} -> {}",
        config.stream.addresses.join(", "),
        config.stream.topic
    );
    if config.backend.kind == "memory" {
        println!("  ⚠ Warning: memory backend does not persist data");
    }
    Ok(())
}

fn show_config(path: Option<&Path>, format: &str) -> Result<()> {
    let config = load_config(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => print!("{}", config.to_toml()?),
        other => anyhow::bail!("unknown format: {} (expected toml or json)", other),
    }
    Ok(())
}
