//! Oracle relay integration tests
//!
//! Decryption requests travel over a channel to a relay task and come back
//! as independent callbacks on a shared pool.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use cipherpool::fhe::{DecryptionOracle, EncryptedAmount, FHEConfig, FheKeySet, OracleSigner};
use cipherpool::pool::{
    Address, CallContext, ConfidentialPool, DecryptionJob, FheCompute, MockCompute, OracleRelay,
    OracleResponder, OracleResponse, PoolConfig, PoolError, PoolEvent, PoolResult, RelayConfig,
    SharedPool,
};

const OWNER: Address = Address::from_bytes([0x01; 32]);
const PROVIDER: Address = Address::from_bytes([0x02; 32]);
const IDENTITY: Address = Address::from_bytes([0xee; 32]);

fn config() -> PoolConfig {
    PoolConfig::new(OWNER, IDENTITY).with_provider(PROVIDER).with_cooldown(0)
}

fn mock_pool() -> (SharedPool<MockCompute>, mpsc::UnboundedReceiver<DecryptionJob>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut backend = MockCompute::new();
    backend.attach_outbox(tx);
    let pool = ConfidentialPool::new(config(), backend).unwrap();
    (Arc::new(Mutex::new(pool)), rx)
}

/// Holds answers back and releases them newest first
struct Reversing<R> {
    inner: R,
    held: Vec<DecryptionJob>,
    release_after: usize,
    answers: mpsc::UnboundedSender<(DecryptionJob, OracleResponse)>,
}

impl<R: OracleResponder> OracleResponder for Reversing<R> {
    fn respond(&mut self, job: &DecryptionJob) -> PoolResult<OracleResponse> {
        self.held.push(job.clone());
        if self.held.len() == self.release_after {
            for held in self.held.drain(..).rev() {
                let response = self.inner.respond(&held)?;
                let _ = self.answers.send((held, response));
            }
        }
        Err(PoolError::Capability("held back".into()))
    }
}

#[tokio::test]
async fn test_scenario_a_through_relay() {
    let (pool, jobs) = mock_pool();
    let oracle = pool.lock().backend().oracle();
    let mut events = pool.lock().subscribe();
    let config = RelayConfig {
        delivery_delay: Duration::from_millis(5),
        redeliver: true,
    };
    let (relay, mut outcomes) = OracleRelay::spawn(pool.clone(), jobs, oracle, config);

    let request_id = {
        let mut pool = pool.lock();
        for (at, amount) in [(0, 10), (1, 15)] {
            let value = pool.backend().encrypt(amount);
            pool.submit_contribution(&CallContext::new(PROVIDER, at), value).unwrap();
        }
        pool.close_current_batch(&CallContext::new(OWNER, 2)).unwrap();
        pool.request_decryption(&CallContext::new(PROVIDER, 3), 1).unwrap()
    };

    let first = outcomes.recv().await.unwrap();
    let second = outcomes.recv().await.unwrap();
    assert_eq!(first.result, Ok(25));
    assert_eq!(second.result, Err(PoolError::Replay(request_id)));

    let mut completed = None;
    while let Ok(record) = events.try_recv() {
        if let PoolEvent::DecryptionCompleted { total, .. } = record.event {
            completed = Some(total);
        }
    }
    assert_eq!(completed, Some(25));

    relay.shutdown().await;
}

#[tokio::test]
async fn test_out_of_order_delivery() {
    let (pool, jobs) = mock_pool();
    let oracle = pool.lock().backend().oracle();
    let (answers_tx, mut answers_rx) = mpsc::unbounded_channel();
    let responder = Reversing {
        inner: oracle,
        held: Vec::new(),
        release_after: 2,
        answers: answers_tx,
    };
    let (relay, _outcomes) = OracleRelay::spawn(pool.clone(), jobs, responder, RelayConfig::default());

    let ids = {
        let mut pool = pool.lock();
        let value = pool.backend().encrypt(9);
        pool.submit_contribution(&CallContext::new(PROVIDER, 0), value).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 1)).unwrap();
        pool.open_new_batch(&CallContext::new(OWNER, 2)).unwrap();
        let value = pool.backend().encrypt(4);
        pool.submit_contribution(&CallContext::new(PROVIDER, 3), value).unwrap();
        pool.close_current_batch(&CallContext::new(OWNER, 4)).unwrap();
        [
            pool.request_decryption(&CallContext::new(PROVIDER, 5), 1).unwrap(),
            pool.request_decryption(&CallContext::new(PROVIDER, 6), 2).unwrap(),
        ]
    };

    let (newest, newest_response) = answers_rx.recv().await.unwrap();
    let (oldest, oldest_response) = answers_rx.recv().await.unwrap();
    assert_eq!(newest.request_id, ids[1]);
    assert_eq!(oldest.request_id, ids[0]);

    let mut pool_guard = pool.lock();
    assert_eq!(
        pool_guard.handle_callback(newest.request_id, &newest_response.cleartext, &newest_response.proof),
        Ok(4)
    );
    assert_eq!(
        pool_guard.handle_callback(oldest.request_id, &oldest_response.cleartext, &oldest_response.proof),
        Ok(9)
    );
    drop(pool_guard);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_tfhe_backend_through_relay() {
    let keys = FheKeySet::generate(&FHEConfig::default()).unwrap();
    let signer = OracleSigner::generate();
    let (tx, jobs) = mpsc::unbounded_channel();

    let mut backend = FheCompute::new(keys.server.clone(), signer.verifying_key());
    backend.attach_outbox(tx);
    let responder = backend.responder(DecryptionOracle::new(keys.client.clone(), signer));
    let pool: SharedPool<FheCompute> = Arc::new(Mutex::new(ConfidentialPool::new(config(), backend).unwrap()));
    let (relay, mut outcomes) = OracleRelay::spawn(pool.clone(), jobs, responder, RelayConfig::default());

    {
        let mut pool = pool.lock();
        for (at, amount) in [(0, 10u64), (1, 15)] {
            let value = EncryptedAmount::encrypt_public(amount, &keys.public).unwrap();
            pool.submit_contribution(&CallContext::new(PROVIDER, at), value).unwrap();
        }
        pool.close_current_batch(&CallContext::new(OWNER, 2)).unwrap();
        pool.request_decryption(&CallContext::new(PROVIDER, 3), 1).unwrap();
    }

    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.result, Ok(25));

    relay.shutdown().await;
}
