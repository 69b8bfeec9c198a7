//! Cipherpool CLI
//!
//! Command-line interface for configuring and exercising a confidential pool.
//!
//! # Usage
//!
//! ```bash
//! # Write a fresh configuration to the default data directory
//! cipherpool init
//!
//! # Run contribute -> close -> decrypt with the in-memory backend
//! cipherpool simulate --amounts 10,15
//!
//! # Same cycle over TFHE, delivering the oracle answer twice
//! cipherpool simulate --backend tfhe --redeliver
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod logging;

use commands::{InitCommand, SimulateCommand};
use config::{resolve_config_path, CipherpoolConfig, LoggingSettings};

/// Cipherpool confidential batch pool
#[derive(Parser)]
#[command(name = "cipherpool")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Confidential batch pooling with oracle-mediated disclosure", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, global = true, env = "CIPHERPOOL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new pool configuration
    Init(InitCommand),

    /// Run a contribute/close/decrypt cycle end to end
    Simulate(SimulateCommand),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging settings come from the config file if there is one
    let path = resolve_config_path(cli.config.as_deref(), cli.data_dir.as_deref());
    let settings = CipherpoolConfig::load(&path)
        .map(|c| c.logging)
        .unwrap_or_else(|_| LoggingSettings::default());
    let (level, json) = logging::resolve(&settings, cli.log_level.as_deref(), cli.json_logs);
    logging::init(&level, json)?;

    match cli.command {
        Commands::Init(cmd) => cmd.execute(cli.config, cli.data_dir).await,
        Commands::Simulate(cmd) => cmd.execute(cli.config, cli.data_dir).await,
        Commands::Version => {
            println!("cipherpool {}", env!("CARGO_PKG_VERSION"));
            println!("Backends: mock, tfhe");
            Ok(())
        }
    }
}
