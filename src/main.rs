//! Ledgate - unified CLI entrypoint.
//!
//! Usage:
//!   ledgate start --config config/ledgate.toml
//!   ledgate start --backend memory --stream-address file:///var/lib/ledgate
//!   ledgate config validate --config config/ledgate.toml
//!   ledgate config show --format json

use anyhow::Result;
use clap::Parser;
use ledgate::cli::commands::{run_config, run_start};
use ledgate::cli::{Cli, Commands};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.map(PathBuf::from);

    match cli.command {
        Commands::Start(args) => run_start(config_path.as_deref(), cli.log_level, args).await,
        Commands::Config(args) => run_config(config_path.as_deref(), args),
    }
}
