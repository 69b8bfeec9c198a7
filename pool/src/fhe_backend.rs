//! TFHE-rs backed capability
//!
//! Contributions are real `FheUint64` ciphertexts. Handles are content
//! digests. Only ciphertexts registered for decryption are visible to the
//! oracle side; a registration lives until the matching request is settled.

use std::collections::HashMap;
use std::sync::Arc;

use cipherpool_fhe::{AmountOps, DecryptionOracle, EncryptedAmount, ServerKey};
use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::capability::{verify_with_key, ConfidentialCompute, DecryptionJob, DecryptionProof, JobQueue};
use crate::errors::{PoolError, PoolResult};
use crate::relay::{OracleResponder, OracleResponse};
use crate::types::{CallbackSelector, CiphertextHandle, RequestId};

/// A ciphertext awaiting one or more decryptions
struct Registered {
    value: EncryptedAmount,
    pending: usize,
}

type Registry = Arc<RwLock<HashMap<CiphertextHandle, Registered>>>;

/// Capability over TFHE-rs encrypted amounts
pub struct FheCompute {
    server_key: ServerKey,
    oracle_key: VerifyingKey,
    registry: Registry,
    jobs: JobQueue,
}

impl FheCompute {
    /// `server_key` performs the additions, `oracle_key` authenticates results
    pub fn new(server_key: ServerKey, oracle_key: VerifyingKey) -> Self {
        Self {
            server_key,
            oracle_key,
            registry: Arc::new(RwLock::new(HashMap::new())),
            jobs: JobQueue::new(),
        }
    }

    /// Route decryption jobs to a channel (for [`crate::OracleRelay`])
    pub fn attach_outbox(&mut self, outbox: mpsc::UnboundedSender<DecryptionJob>) {
        self.jobs.attach(outbox);
    }

    pub fn detach_outbox(&mut self) {
        self.jobs.detach();
    }

    pub fn take_pending_jobs(&mut self) -> Vec<DecryptionJob> {
        self.jobs.take_pending()
    }

    /// Number of ciphertexts currently open for decryption
    pub fn registered_handles(&self) -> usize {
        self.registry.read().len()
    }

    /// Oracle side sharing this capability's handle registry
    pub fn responder(&self, oracle: DecryptionOracle) -> FheResponder {
        FheResponder {
            oracle,
            registry: Arc::clone(&self.registry),
        }
    }
}

impl ConfidentialCompute for FheCompute {
    type Ciphertext = EncryptedAmount;

    fn is_ready(&self) -> bool {
        self.server_key.is_installed()
    }

    fn ensure_ready(&mut self) -> PoolResult<()> {
        if self.server_key.install() {
            debug!("server key installed on current thread");
        }
        Ok(())
    }

    fn add(&self, a: &EncryptedAmount, b: &EncryptedAmount) -> PoolResult<EncryptedAmount> {
        Ok(AmountOps::add(a, b, &self.server_key)?)
    }

    fn to_handle(&self, value: &EncryptedAmount) -> PoolResult<CiphertextHandle> {
        Ok(CiphertextHandle::from_bytes(value.digest()?))
    }

    fn register_for_decryption(&self, value: &EncryptedAmount) -> PoolResult<CiphertextHandle> {
        let handle = self.to_handle(value)?;
        self.registry
            .write()
            .entry(handle)
            .or_insert_with(|| Registered {
                value: value.clone(),
                pending: 0,
            })
            .pending += 1;
        Ok(handle)
    }

    fn release(&self, handles: &[CiphertextHandle]) {
        let mut registry = self.registry.write();
        for handle in handles {
            if let Some(entry) = registry.get_mut(handle) {
                entry.pending -= 1;
                if entry.pending == 0 {
                    registry.remove(handle);
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
            let registry = self.registry.read();
            if let Some(unknown) = handles
                .iter()
                .find(|h| !h.is_zero() && !registry.contains_key(h))
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
        verify_with_key(&self.oracle_key, request_id, cleartext, proof)
    }
}

/// Oracle side of [`FheCompute`]: decrypts registered handles and signs
pub struct FheResponder {
    oracle: DecryptionOracle,
    registry: Registry,
}

impl OracleResponder for FheResponder {
    fn respond(&mut self, job: &DecryptionJob) -> PoolResult<OracleResponse> {
        let registry = self.registry.read();
        let mut values = Vec::with_capacity(job.handles.len());
        for handle in &job.handles {
            if handle.is_zero() {
                values.push(None);
                continue;
            }
            let entry = registry.get(handle).ok_or_else(|| {
                PoolError::Capability(format!("unknown ciphertext handle {}", handle))
            })?;
            values.push(Some(&entry.value));
        }

        let (cleartext, proof) = self.oracle.reveal(job.request_id.value(), &values);
        Ok(OracleResponse { cleartext, proof })
    }
}
