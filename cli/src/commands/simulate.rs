//! Simulate Command - Run the contribute/close/decrypt cycle end to end
//!
//! Builds a pool from the configuration, routes decryption requests through
//! the oracle relay and prints every pool event as a JSON line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::Args;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::info;

use cipherpool_core::{
    CallContext, ConfidentialCompute, ConfidentialPool, DecryptionJob, FheCompute, MockCompute,
    OracleRelay, OracleResponder, PoolConfig, RelayConfig, SharedPool,
};
use cipherpool_fhe::{DecryptionOracle, EncryptedAmount, FHEConfig, FheKeySet, OracleSigner};

use crate::config::{resolve_config_path, Backend, CipherpoolConfig, ConfigError};

/// Longest wait for the oracle answer
const ORACLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Run a full pooling cycle against the configured backend
#[derive(Args)]
pub struct SimulateCommand {
    /// Override the configured backend
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    /// Amounts submitted by the first provider, in order
    #[arg(long, value_delimiter = ',', default_values_t = vec![10u64, 15])]
    amounts: Vec<u64>,

    /// Deliver the oracle answer twice to exercise the replay guard
    #[arg(long)]
    redeliver: bool,
}

impl SimulateCommand {
    pub async fn execute(self, config: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
        let path = resolve_config_path(config.as_deref(), data_dir.as_deref());
        let config = match CipherpoolConfig::load(&path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                info!("No configuration at {}, using an ephemeral one", path.display());
                CipherpoolConfig::generate()
            }
            Err(e) => return Err(e).context("loading configuration"),
        };

        let pool_config = config.pool_config()?;
        let relay_config = RelayConfig {
            delivery_delay: Duration::from_millis(config.oracle.delivery_delay_ms),
            redeliver: self.redeliver,
        };
        let backend = self.backend.unwrap_or(config.oracle.backend);
        info!(?backend, amounts = ?self.amounts, "starting simulation");

        let total = match backend {
            Backend::Mock => {
                let (tx, jobs) = mpsc::unbounded_channel();
                let mut compute = MockCompute::new();
                compute.attach_outbox(tx);
                let responder = compute.oracle();
                let pool = shared(pool_config, compute)?;
                run(pool, jobs, responder, relay_config, &self.amounts, |compute, amount| {
                    Ok(compute.encrypt(amount))
                })
                .await?
            }
            Backend::Tfhe => {
                let fhe_config = FHEConfig {
                    security_bits: config.oracle.security_bits,
                };
                info!(security_bits = fhe_config.security_bits, "generating FHE keys");
                let keys = FheKeySet::generate(&fhe_config)?;
                let signer = OracleSigner::generate();
                info!(
                    oracle_key = %hex::encode(signer.verifying_key().as_bytes()),
                    "oracle signing key generated"
                );

                let (tx, jobs) = mpsc::unbounded_channel();
                let mut compute = FheCompute::new(keys.server.clone(), signer.verifying_key());
                compute.attach_outbox(tx);
                let responder = compute.responder(DecryptionOracle::new(keys.client.clone(), signer));
                let pool = shared(pool_config, compute)?;
                run(pool, jobs, responder, relay_config, &self.amounts, |_, amount| {
                    Ok(EncryptedAmount::encrypt_public(amount, &keys.public)?)
                })
                .await?
            }
        };

        let expected: u64 = self.amounts.iter().fold(0u64, |acc, a| acc.wrapping_add(*a));
        info!(total, expected, "simulation finished");
        if total != expected {
            anyhow::bail!("revealed total {} does not match submitted sum {}", total, expected);
        }
        Ok(())
    }
}

fn shared<B: ConfidentialCompute>(config: PoolConfig, backend: B) -> anyhow::Result<SharedPool<B>> {
    Ok(Arc::new(Mutex::new(ConfidentialPool::new(config, backend)?)))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Contribute, close, request decryption and wait for the relayed callback.
/// Returns the revealed total.
async fn run<B, R, F>(
    pool: SharedPool<B>,
    jobs: mpsc::UnboundedReceiver<DecryptionJob>,
    responder: R,
    relay_config: RelayConfig,
    amounts: &[u64],
    encrypt: F,
) -> anyhow::Result<u64>
where
    B: ConfidentialCompute + Send + 'static,
    B::Ciphertext: Send,
    R: OracleResponder,
    F: Fn(&B, u64) -> anyhow::Result<B::Ciphertext>,
{
    let (relay, mut outcomes) = OracleRelay::spawn(pool.clone(), jobs, responder, relay_config);

    let request_id = {
        let mut pool = pool.lock();
        let owner = pool.owner();
        let provider = pool
            .providers()
            .first()
            .copied()
            .context("configuration has no provider")?;
        let cooldown = pool.cooldown_secs();

        let mut clock = now_secs();
        for amount in amounts {
            let value = encrypt(pool.backend(), *amount)?;
            pool.submit_contribution(&CallContext::new(provider, clock), value)?;
            clock = clock.saturating_add(cooldown);
        }
        let batch_id = pool.close_current_batch(&CallContext::new(owner, clock))?;
        pool.request_decryption(&CallContext::new(provider, clock), batch_id)?
    };

    let mut total = None;
    while let Some(outcome) = tokio::time::timeout(ORACLE_TIMEOUT, outcomes.recv())
        .await
        .context("timed out waiting for the oracle")?
    {
        if outcome.request_id != request_id {
            continue;
        }
        match (outcome.attempt, outcome.result) {
            (1, result) => total = Some(result?),
            (attempt, Err(err)) => info!(attempt, %err, "redelivery rejected"),
            (attempt, Ok(_)) => anyhow::bail!("redelivery {} was accepted", attempt),
        }
        let expected_attempts = if relay_config.redeliver { 2 } else { 1 };
        if outcome.attempt >= expected_attempts {
            break;
        }
    }
    relay.shutdown().await;

    for record in pool.lock().events() {
        println!("{}", serde_json::to_string(record)?);
    }

    total.context("oracle never answered the decryption request")
}
