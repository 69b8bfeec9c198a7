//! In-memory stand-in for the encryption subsystem and oracle
//!
//! Ciphertexts carry their plaintext next to a marker id; handles are derived
//! from the id. The oracle only answers for values registered for
//! decryption. Useful for driving the batch and decryption state machines
//! without TFHE key generation.

use std::collections::HashMap;
use std::sync::Arc;

use cipherpool_fhe::{encode_cleartext_word, OracleSigner};
use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::capability::{verify_with_key, ConfidentialCompute, DecryptionJob, DecryptionProof, JobQueue};
use crate::errors::{PoolError, PoolResult};
use crate::relay::{OracleResponder, OracleResponse};
use crate::types::{CallbackSelector, CiphertextHandle, RequestId};

/// Seed of the default mock oracle key
pub const MOCK_ORACLE_SEED: [u8; 32] = [0x42; 32];

/// Plaintext-passthrough ciphertext
#[derive(Clone, PartialEq, Eq)]
pub struct MockCiphertext {
    id: u64,
    value: u64,
}

impl MockCiphertext {
    /// Marker id assigned at creation
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for MockCiphertext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCiphertext")
            .field("id", &self.id)
            .field("value", &"<encrypted>")
            .finish()
    }
}

#[derive(Debug, Default)]
struct MockStore {
    next_id: u64,
    remap_epoch: u64,
    handles: HashMap<u64, CiphertextHandle>,
    /// Registered plaintexts with their outstanding registration count
    registered: HashMap<CiphertextHandle, (u64, usize)>,
}

impl MockStore {
    fn mint(&mut self, value: u64) -> MockCiphertext {
        self.next_id += 1;
        MockCiphertext {
            id: self.next_id,
            value,
        }
    }

    fn derive_handle(id: u64, epoch: u64) -> CiphertextHandle {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"cipherpool-mock-handle");
        hasher.update(&id.to_le_bytes());
        hasher.update(&epoch.to_le_bytes());
        CiphertextHandle::from_bytes(*hasher.finalize().as_bytes())
    }
}

/// Mock capability
pub struct MockCompute {
    store: Arc<RwLock<MockStore>>,
    signer: Arc<OracleSigner>,
    verifying_key: VerifyingKey,
    jobs: JobQueue,
    available: bool,
    ready: bool,
}

impl Default for MockCompute {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompute {
    /// Mock with the deterministic [`MOCK_ORACLE_SEED`] oracle key
    pub fn new() -> Self {
        Self::with_signer(OracleSigner::from_seed(MOCK_ORACLE_SEED))
    }

    pub fn with_signer(signer: OracleSigner) -> Self {
        let verifying_key = signer.verifying_key();
        Self {
            store: Arc::new(RwLock::new(MockStore::default())),
            signer: Arc::new(signer),
            verifying_key,
            jobs: JobQueue::new(),
            available: true,
            ready: false,
        }
    }

    /// "Encrypt" a value
    pub fn encrypt(&self, value: u64) -> MockCiphertext {
        self.store.write().mint(value)
    }

    /// Read the plaintext behind a mock ciphertext
    pub fn reveal(&self, value: &MockCiphertext) -> u64 {
        value.value
    }

    /// Simulate the encryption subsystem going offline
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
        if !available {
            self.ready = false;
        }
    }

    /// Give `value` a new handle, as if the underlying ciphertext had been
    /// rewritten behind the pool's back
    pub fn remap_handle(&self, value: &MockCiphertext) -> CiphertextHandle {
        let mut store = self.store.write();
        store.remap_epoch += 1;
        let handle = MockStore::derive_handle(value.id, store.remap_epoch);
        store.handles.insert(value.id, handle);
        handle
    }

    /// Number of values currently open for decryption
    pub fn registered_handles(&self) -> usize {
        self.store.read().registered.len()
    }

    /// Route decryption jobs to a channel (for [`crate::OracleRelay`])
    pub fn attach_outbox(&mut self, outbox: mpsc::UnboundedSender<DecryptionJob>) {
        self.jobs.attach(outbox);
    }

    pub fn detach_outbox(&mut self) {
        self.jobs.detach();
    }

    /// Jobs waiting for the oracle
    pub fn pending_jobs(&self) -> &[DecryptionJob] {
        self.jobs.pending()
    }

    pub fn take_pending_jobs(&mut self) -> Vec<DecryptionJob> {
        self.jobs.take_pending()
    }

    /// Oracle side of this mock, sharing its ciphertext store and key
    pub fn oracle(&self) -> MockOracle {
        MockOracle {
            store: Arc::clone(&self.store),
            signer: Arc::clone(&self.signer),
        }
    }
}

impl ConfidentialCompute for MockCompute {
    type Ciphertext = MockCiphertext;

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn ensure_ready(&mut self) -> PoolResult<()> {
        if !self.available {
            return Err(PoolError::EncryptionUnavailable("mock encryption offline".into()));
        }
        self.ready = true;
        Ok(())
    }

    fn add(&self, a: &MockCiphertext, b: &MockCiphertext) -> PoolResult<MockCiphertext> {
        Ok(self.store.write().mint(a.value.wrapping_add(b.value)))
    }

    fn to_handle(&self, value: &MockCiphertext) -> PoolResult<CiphertextHandle> {
        let mut store = self.store.write();
        Ok(*store
            .handles
            .entry(value.id)
            .or_insert_with(|| MockStore::derive_handle(value.id, 0)))
    }

    fn register_for_decryption(&self, value: &MockCiphertext) -> PoolResult<CiphertextHandle> {
        let handle = self.to_handle(value)?;
        let mut store = self.store.write();
        store.registered.entry(handle).or_insert((value.value, 0)).1 += 1;
        Ok(handle)
    }

    fn release(&self, handles: &[CiphertextHandle]) {
        let mut store = self.store.write();
        for handle in handles {
            if let Some((_, pending)) = store.registered.get_mut(handle) {
                *pending -= 1;
                if *pending == 0 {
                    store.registered.remove(handle);
                }
            }
        }
    }

    fn next_request_id(&self) -> RequestId {
        self.jobs.peek_request_id()
    }

    fn request_decryption(
        &mut self,
        handles: &[CiphertextHandle],
        callback: CallbackSelector,
    ) -> PoolResult<RequestId> {
        {
            let store = self.store.read();
            if let Some(unknown) = handles
                .iter()
                .find(|h| !h.is_zero() && !store.registered.contains_key(h))
            {
                return Err(PoolError::Capability(format!(
                    "unknown ciphertext handle {}",
                    unknown
                )));
            }
        }
        self.jobs.enqueue(handles, callback)
    }

    fn verify_proof(&self, request_id: RequestId, cleartext: &[u8], proof: &DecryptionProof) -> bool {
        verify_with_key(&self.verifying_key, request_id, cleartext, proof)
    }
}

/// Oracle half of [`MockCompute`]
#[derive(Clone)]
pub struct MockOracle {
    store: Arc<RwLock<MockStore>>,
    signer: Arc<OracleSigner>,
}

impl MockOracle {
    /// Answer a job honestly
    pub fn fulfil(&self, job: &DecryptionJob) -> PoolResult<OracleResponse> {
        let store = self.store.read();
        let mut cleartext = Vec::with_capacity(job.handles.len() * 32);
        for handle in &job.handles {
            let value = if handle.is_zero() {
                0
            } else {
                store
                    .registered
                    .get(handle)
                    .map(|(value, _)| *value)
                    .ok_or_else(|| {
                        PoolError::Capability(format!("unknown ciphertext handle {}", handle))
                    })?
            };
            cleartext.extend_from_slice(&encode_cleartext_word(value));
        }
        let proof = self.signer.sign(job.request_id.value(), &cleartext);
        Ok(OracleResponse { cleartext, proof })
    }

    /// Sign an arbitrary cleartext for `request_id`
    pub fn attest(&self, request_id: RequestId, cleartext: &[u8]) -> DecryptionProof {
        self.signer.sign(request_id.value(), cleartext)
    }
}

impl OracleResponder for MockOracle {
    fn respond(&mut self, job: &DecryptionJob) -> PoolResult<OracleResponse> {
        self.fulfil(job)
    }
}
