//! Confidential-compute capability
//!
//! The pool never touches plaintext. Everything it needs from the encryption
//! subsystem and the decryption oracle goes through [`ConfidentialCompute`].

use ed25519_dalek::VerifyingKey;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{PoolError, PoolResult};
use crate::types::{CallbackSelector, CiphertextHandle, RequestId};

pub use cipherpool_fhe::DecryptionSignature as DecryptionProof;

/// Encrypted arithmetic plus the asynchronous decryption oracle
pub trait ConfidentialCompute {
    /// Encrypted value type
    type Ciphertext: Clone;

    /// Whether the encryption subsystem is initialized for the calling context
    fn is_ready(&self) -> bool;

    /// Lazily initialize the encryption subsystem
    fn ensure_ready(&mut self) -> PoolResult<()>;

    /// Homomorphic addition
    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> PoolResult<Self::Ciphertext>;

    /// Stable opaque handle for `value`; equal inputs give equal handles.
    /// Computing a handle does not make it decryptable.
    fn to_handle(&self, value: &Self::Ciphertext) -> PoolResult<CiphertextHandle>;

    /// Make `value` resolvable by the oracle and return its handle. Each
    /// registration is paired with one [`ConfidentialCompute::release`].
    fn register_for_decryption(&self, value: &Self::Ciphertext) -> PoolResult<CiphertextHandle>;

    /// Drop one registration per handle. Unknown and zero handles are ignored.
    fn release(&self, handles: &[CiphertextHandle]);

    /// Id the next [`ConfidentialCompute::request_decryption`] will assign
    fn next_request_id(&self) -> RequestId;

    /// Register an asynchronous decryption of `handles`. The result arrives
    /// later through `callback`; delivery order is not guaranteed.
    fn request_decryption(
        &mut self,
        handles: &[CiphertextHandle],
        callback: CallbackSelector,
    ) -> PoolResult<RequestId>;

    /// Check that `proof` authenticates `cleartext` as the result of `request_id`
    fn verify_proof(&self, request_id: RequestId, cleartext: &[u8], proof: &DecryptionProof) -> bool;
}

/// A decryption the oracle still has to answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionJob {
    pub request_id: RequestId,
    pub handles: Vec<CiphertextHandle>,
    pub callback: CallbackSelector,
}

/// Issues request ids and hands jobs to the oracle side.
///
/// With an outbox attached jobs are sent over the channel; otherwise they
/// pile up in `pending` until someone takes them.
#[derive(Debug)]
pub struct JobQueue {
    next_request_id: u64,
    outbox: Option<mpsc::UnboundedSender<DecryptionJob>>,
    pending: Vec<DecryptionJob>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            next_request_id: 1,
            outbox: None,
            pending: Vec::new(),
        }
    }

    /// Route future jobs to `outbox`
    pub fn attach(&mut self, outbox: mpsc::UnboundedSender<DecryptionJob>) {
        self.outbox = Some(outbox);
    }

    /// Stop routing jobs to the channel. Dropping the sender lets the
    /// receiving side drain and finish.
    pub fn detach(&mut self) {
        self.outbox = None;
    }

    /// Id the next enqueued job will carry
    pub fn peek_request_id(&self) -> RequestId {
        RequestId::new(self.next_request_id)
    }

    /// Assign a fresh request id and dispatch the job
    pub fn enqueue(
        &mut self,
        handles: &[CiphertextHandle],
        callback: CallbackSelector,
    ) -> PoolResult<RequestId> {
        let request_id = RequestId::new(self.next_request_id);
        let job = DecryptionJob {
            request_id,
            handles: handles.to_vec(),
            callback,
        };

        match &self.outbox {
            Some(outbox) => outbox
                .send(job)
                .map_err(|_| PoolError::Capability("oracle outbox closed".into()))?,
            None => self.pending.push(job),
        }

        self.next_request_id += 1;
        debug!(%request_id, handles = handles.len(), "decryption job dispatched");
        Ok(request_id)
    }

    /// Jobs not yet picked up
    pub fn pending(&self) -> &[DecryptionJob] {
        &self.pending
    }

    /// Drain jobs not yet picked up
    pub fn take_pending(&mut self) -> Vec<DecryptionJob> {
        std::mem::take(&mut self.pending)
    }
}

/// Verify a proof against the oracle key
pub(crate) fn verify_with_key(
    verifying_key: &VerifyingKey,
    request_id: RequestId,
    cleartext: &[u8],
    proof: &DecryptionProof,
) -> bool {
    cipherpool_fhe::verify_decryption(verifying_key, request_id.value(), cleartext, proof)
}
