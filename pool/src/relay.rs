//! Asynchronous oracle relay
//!
//! Decryption requests leave the pool as [`DecryptionJob`]s on an mpsc
//! channel. The relay task answers each job through an [`OracleResponder`]
//! and feeds the result back into the shared pool as a separate callback,
//! so request and callback never share a call stack.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capability::{ConfidentialCompute, DecryptionJob, DecryptionProof};
use crate::errors::{PoolError, PoolResult};
use crate::pool::ConfidentialPool;
use crate::types::{CallbackSelector, RequestId};

/// Pool handle shared between callers and the relay
pub type SharedPool<B> = Arc<Mutex<ConfidentialPool<B>>>;

/// What the oracle hands back for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResponse {
    pub cleartext: Vec<u8>,
    pub proof: DecryptionProof,
}

/// Oracle side: turns a job into a signed cleartext
pub trait OracleResponder: Send + 'static {
    fn respond(&mut self, job: &DecryptionJob) -> PoolResult<OracleResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Wait before each delivery
    pub delivery_delay: Duration,
    /// Deliver every response twice, as a duplicating transport would
    pub redeliver: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            delivery_delay: Duration::ZERO,
            redeliver: false,
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub request_id: RequestId,
    /// 1 for the first delivery, 2 for a redelivery
    pub attempt: u32,
    pub result: PoolResult<u64>,
}

/// Handle to a running relay task
pub struct OracleRelay {
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl OracleRelay {
    /// Start relaying `jobs` into `pool`. Outcomes of every delivery are
    /// reported on the returned receiver.
    pub fn spawn<B, R>(
        pool: SharedPool<B>,
        jobs: mpsc::UnboundedReceiver<DecryptionJob>,
        responder: R,
        config: RelayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RelayOutcome>)
    where
        B: ConfidentialCompute + Send + 'static,
        B::Ciphertext: Send,
        R: OracleResponder,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(pool, jobs, responder, config, shutdown_rx, outcomes_tx));
        info!(?config, "oracle relay started");
        (Self { shutdown, worker }, outcomes_rx)
    }

    /// Stop after the job in progress, dropping anything still queued.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.worker.await {
            warn!(%err, "oracle relay task failed");
        }
    }

    /// Wait until the job channel closes and every queued job is delivered.
    pub async fn join(self) {
        if let Err(err) = self.worker.await {
            warn!(%err, "oracle relay task failed");
        }
    }
}

async fn run<B, R>(
    pool: SharedPool<B>,
    mut jobs: mpsc::UnboundedReceiver<DecryptionJob>,
    mut responder: R,
    config: RelayConfig,
    mut shutdown: watch::Receiver<bool>,
    outcomes: mpsc::UnboundedSender<RelayOutcome>,
) where
    B: ConfidentialCompute + Send + 'static,
    B::Ciphertext: Send,
    R: OracleResponder,
{
    loop {
        let job = tokio::select! {
            _ = shutdown.changed() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        let request_id = job.request_id;

        if job.callback != CallbackSelector::HANDLE_CALLBACK {
            warn!(%request_id, callback = job.callback.name(), "unknown callback selector");
            let _ = outcomes.send(RelayOutcome {
                request_id,
                attempt: 1,
                result: Err(PoolError::Capability(format!(
                    "unknown callback selector {}",
                    job.callback.name()
                ))),
            });
            continue;
        }

        let response = match responder.respond(&job) {
            Ok(response) => response,
            Err(err) => {
                warn!(%request_id, %err, "oracle could not answer job");
                let _ = outcomes.send(RelayOutcome {
                    request_id,
                    attempt: 1,
                    result: Err(err),
                });
                continue;
            }
        };

        let attempts = if config.redeliver { 2 } else { 1 };
        for attempt in 1..=attempts {
            if !config.delivery_delay.is_zero() {
                tokio::time::sleep(config.delivery_delay).await;
            }
            let result = pool
                .lock()
                .handle_callback(request_id, &response.cleartext, &response.proof);
            debug!(%request_id, attempt, ok = result.is_ok(), "callback delivered");
            let _ = outcomes.send(RelayOutcome {
                request_id,
                attempt,
                result,
            });
        }
    }
    info!("oracle relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCompute;
    use crate::pool::PoolConfig;
    use crate::types::{Address, CallContext};

    const OWNER: Address = Address::from_bytes([1; 32]);
    const ALICE: Address = Address::from_bytes([2; 32]);
    const IDENTITY: Address = Address::from_bytes([0xcc; 32]);

    fn shared_pool() -> (SharedPool<MockCompute>, mpsc::UnboundedReceiver<DecryptionJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut backend = MockCompute::new();
        backend.attach_outbox(tx);
        let config = PoolConfig::new(OWNER, IDENTITY).with_provider(ALICE).with_cooldown(0);
        let pool = ConfidentialPool::new(config, backend).unwrap();
        (Arc::new(Mutex::new(pool)), rx)
    }

    fn close_with(pool: &SharedPool<MockCompute>, amounts: &[u64]) {
        let mut pool = pool.lock();
        for (i, amount) in amounts.iter().enumerate() {
            let value = pool.backend().encrypt(*amount);
            pool.submit_contribution(&CallContext::new(ALICE, i as u64), value)
                .unwrap();
        }
        pool.close_current_batch(&CallContext::new(OWNER, 100)).unwrap();
    }

    #[tokio::test]
    async fn test_relay_delivers_callback() {
        let (pool, jobs) = shared_pool();
        let oracle = pool.lock().backend().oracle();
        let (relay, mut outcomes) = OracleRelay::spawn(pool.clone(), jobs, oracle, RelayConfig::default());

        close_with(&pool, &[10, 15]);
        let id = pool
            .lock()
            .request_decryption(&CallContext::new(ALICE, 101), 1)
            .unwrap();

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.request_id, id);
        assert_eq!(outcome.result, Ok(25));
        assert!(pool.lock().decryption_context(id).unwrap().processed);

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_redelivery_is_rejected_as_replay() {
        let (pool, jobs) = shared_pool();
        let oracle = pool.lock().backend().oracle();
        let config = RelayConfig {
            redeliver: true,
            ..Default::default()
        };
        let (relay, mut outcomes) = OracleRelay::spawn(pool.clone(), jobs, oracle, config);

        close_with(&pool, &[7]);
        let id = pool
            .lock()
            .request_decryption(&CallContext::new(ALICE, 101), 1)
            .unwrap();

        let first = outcomes.recv().await.unwrap();
        let second = outcomes.recv().await.unwrap();
        assert_eq!((first.attempt, first.result), (1, Ok(7)));
        assert_eq!((second.attempt, second.result), (2, Err(PoolError::Replay(id))));

        relay.shutdown().await;
    }

    struct Silent;

    impl OracleResponder for Silent {
        fn respond(&mut self, _job: &DecryptionJob) -> PoolResult<OracleResponse> {
            Err(PoolError::Capability("oracle offline".into()))
        }
    }

    #[tokio::test]
    async fn test_responder_failure_leaves_request_pending() {
        let (pool, jobs) = shared_pool();
        let (relay, mut outcomes) = OracleRelay::spawn(pool.clone(), jobs, Silent, RelayConfig::default());

        close_with(&pool, &[1]);
        let id = pool
            .lock()
            .request_decryption(&CallContext::new(ALICE, 101), 1)
            .unwrap();

        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome.result, Err(PoolError::Capability(_))));
        assert!(!pool.lock().decryption_context(id).unwrap().processed);

        relay.shutdown().await;
    }

    #[tokio::test]
    async fn test_join_drains_queue() {
        let (pool, jobs) = shared_pool();
        let oracle = pool.lock().backend().oracle();
        let (relay, mut outcomes) = OracleRelay::spawn(pool.clone(), jobs, oracle, RelayConfig::default());

        close_with(&pool, &[2, 3]);
        for at in [101, 102] {
            pool.lock()
                .request_decryption(&CallContext::new(ALICE, at), 1)
                .unwrap();
        }
        pool.lock().backend_mut().detach_outbox();
        relay.join().await;

        let mut totals = Vec::new();
        while let Some(outcome) = outcomes.recv().await {
            totals.push(outcome.result.unwrap());
        }
        assert_eq!(totals, vec![5, 5]);
    }
}
