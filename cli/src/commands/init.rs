//! Init Command - Write a fresh pool configuration

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::config::{default_config_path, default_data_dir, Backend, CipherpoolConfig};

/// Initialize a new pool configuration
#[derive(Args)]
pub struct InitCommand {
    /// Encryption backend to configure
    #[arg(short, long, value_enum, default_value = "mock")]
    backend: Backend,

    /// Cooldown between rate-limited actions (seconds)
    #[arg(long)]
    cooldown: Option<u64>,

    /// Force overwrite existing configuration
    #[arg(short, long)]
    force: bool,
}

impl InitCommand {
    pub async fn execute(self, config: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let config_path = config.unwrap_or_else(|| default_config_path(&data_dir));

        info!("Data directory: {}", data_dir.display());

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Pool already initialized at {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        let mut config = CipherpoolConfig::generate();
        config.oracle.backend = self.backend;
        if let Some(cooldown) = self.cooldown {
            config.pool.cooldown_secs = cooldown;
        }
        config.save(&config_path)?;

        info!("Configuration saved to {}", config_path.display());

        println!();
        println!("cipherpool initialized");
        println!();
        println!("Configuration: {}", config_path.display());
        println!("Owner:         {}", config.pool.owner);
        println!("Identity:      {}", config.pool.identity);
        println!("Provider:      {}", config.pool.providers.join(", "));
        println!();
        println!("To run the end-to-end scenario:");
        println!("  cipherpool simulate --config {}", config_path.display());

        Ok(())
    }
}
