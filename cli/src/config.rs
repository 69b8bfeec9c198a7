//! Cipherpool Configuration
//!
//! Handles loading and saving the pool configuration from TOML files.

use std::fs;
use std::path::{Path, PathBuf};

use cipherpool_core::{Address, PoolConfig, PoolError};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Full cipherpool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CipherpoolConfig {
    /// Pool roles and limits
    pub pool: PoolSettings,

    /// Oracle backend settings
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl CipherpoolConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Fresh configuration with random owner, identity and one provider
    pub fn generate() -> Self {
        let random_hex = || hex::encode(rand::random::<[u8; 32]>());
        Self {
            pool: PoolSettings {
                owner: random_hex(),
                identity: random_hex(),
                providers: vec![random_hex()],
                cooldown_secs: cipherpool_core::DEFAULT_COOLDOWN_SECS,
                start_paused: false,
            },
            oracle: OracleSettings::default(),
            logging: LoggingSettings::default(),
        }
    }

    /// Core pool parameters
    pub fn pool_config(&self) -> Result<PoolConfig, ConfigError> {
        let providers = self
            .pool
            .providers
            .iter()
            .map(|p| parse_address("provider", p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PoolConfig::new(
            parse_address("owner", &self.pool.owner)?,
            parse_address("identity", &self.pool.identity)?,
        )
        .with_providers(providers)
        .with_cooldown(self.pool.cooldown_secs)
        .paused(self.pool.start_paused))
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let config = self.pool_config()?;

        if config.owner.is_zero() {
            return Err(ConfigError::Invalid("Owner cannot be the zero address".to_string()));
        }

        if config.identity.is_zero() {
            return Err(ConfigError::Invalid(
                "Identity cannot be the zero address".to_string(),
            ));
        }

        if config.providers.iter().any(Address::is_zero) {
            return Err(ConfigError::Invalid(
                "Providers cannot include the zero address".to_string(),
            ));
        }

        if self.oracle.security_bits == 0 {
            return Err(ConfigError::Invalid(
                "Security bits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    Address::from_hex(value).map_err(|e| match e {
        PoolError::InvalidParameter(msg) => ConfigError::Invalid(format!("{}: {}", field, msg)),
        other => ConfigError::Invalid(format!("{}: {}", field, other)),
    })
}

/// Pool roles and limits. Addresses are 32-byte hex strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Owner address
    pub owner: String,

    /// Deployment identity bound into decryption fingerprints
    pub identity: String,

    /// Initially authorized providers
    #[serde(default)]
    pub providers: Vec<String>,

    /// Cooldown between two rate-limited actions of one provider
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Start with the pool paused
    #[serde(default)]
    pub start_paused: bool,
}

fn default_cooldown_secs() -> u64 {
    cipherpool_core::DEFAULT_COOLDOWN_SECS
}

/// Encryption backend behind the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-memory plaintext passthrough
    Mock,
    /// TFHE-rs encrypted u64 amounts
    Tfhe,
}

/// Oracle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Encryption backend
    pub backend: Backend,

    /// FHE security parameter (tfhe backend only)
    pub security_bits: u32,

    /// Delay before the relay delivers each callback
    pub delivery_delay_ms: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Mock,
            security_bits: 128,
            delivery_delay_ms: 0,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level
    pub level: String,

    /// Output format (text, json)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("io", "cipherpool", "cipherpool")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".cipherpool"))
}

/// Get default config file path
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Config file to use: explicit path, else the one in the data directory
pub fn resolve_config_path(config: Option<&Path>, data_dir: Option<&Path>) -> PathBuf {
    match config {
        Some(path) => path.to_path_buf(),
        None => default_config_path(&data_dir.map(Path::to_path_buf).unwrap_or_else(default_data_dir)),
    }
}
