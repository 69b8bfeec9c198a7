//! Decryption coordinator
//!
//! Per request: `Requested -> Processed`, nothing else. A callback is only
//! accepted if, in order:
//!
//! 1. the request exists and has not been processed (replay guard)
//! 2. the fingerprint of the batch's *current* ciphertext handles matches
//!    the one recorded at request time (state drift guard)
//! 3. the oracle's proof verifies (authenticity)
//! 4. the cleartext decodes to one total per handle
//!
//! A rejected callback leaves the request pending, so a later valid delivery
//! can still finalize it.
//!
//! Only the batch total is registered with the oracle, and only while its
//! request is open. Individual contributions are never decryptable.

use std::collections::BTreeMap;

use cipherpool_fhe::decode_cleartext_words;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capability::{ConfidentialCompute, DecryptionProof};
use crate::errors::{PoolError, PoolResult};
use crate::ledger::{Batch, BatchLedger};
use crate::types::{Address, BatchId, CallbackSelector, CiphertextHandle, Fingerprint, RequestId};

/// Key-derivation context for fingerprints
const FINGERPRINT_CONTEXT: &str = "cipherpool 2024 decryption request fingerprint v1";

/// What was asked for, and whether it has been answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionContext {
    pub batch_id: BatchId,
    pub fingerprint: Fingerprint,
    pub processed: bool,
}

/// A finalized decryption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionOutcome {
    pub request_id: RequestId,
    pub batch_id: BatchId,
    pub total: u64,
}

/// Digest over an ordered list of handles, bound to the deployment identity
pub fn compute_fingerprint(handles: &[CiphertextHandle], identity: &Address) -> Fingerprint {
    let mut hasher = blake3::Hasher::new_derive_key(FINGERPRINT_CONTEXT);
    hasher.update(&(handles.len() as u64).to_be_bytes());
    for handle in handles {
        hasher.update(handle.as_bytes());
    }
    hasher.update(identity.as_bytes());
    Fingerprint::from_bytes(*hasher.finalize().as_bytes())
}

/// Handles revealed for a batch: its accumulated total, or the zero handle
/// if nothing was ever contributed.
pub fn batch_handles<B: ConfidentialCompute>(
    backend: &B,
    batch: &Batch<B::Ciphertext>,
) -> PoolResult<Vec<CiphertextHandle>> {
    let handle = match batch.accumulated() {
        Some(total) => backend.to_handle(total)?,
        None => CiphertextHandle::ZERO,
    };
    Ok(vec![handle])
}

/// Owner of all decryption contexts
#[derive(Debug, Clone, Default)]
pub struct DecryptionCoordinator {
    contexts: BTreeMap<RequestId, DecryptionContext>,
}

impl DecryptionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the oracle to reveal the total of a closed batch.
    pub fn request<B: ConfidentialCompute>(
        &mut self,
        backend: &mut B,
        ledger: &BatchLedger<B::Ciphertext>,
        identity: &Address,
        batch_id: BatchId,
    ) -> PoolResult<RequestId> {
        let batch = ledger.closed_batch(batch_id)?;

        let next = backend.next_request_id();
        if self.contexts.contains_key(&next) {
            return Err(PoolError::Capability(format!(
                "oracle would reissue request id {}",
                next
            )));
        }

        let handles = match batch.accumulated() {
            Some(total) => vec![backend.register_for_decryption(total)?],
            None => vec![CiphertextHandle::ZERO],
        };
        let fingerprint = compute_fingerprint(&handles, identity);

        let request_id = match backend.request_decryption(&handles, CallbackSelector::HANDLE_CALLBACK) {
            Ok(request_id) => request_id,
            Err(err) => {
                backend.release(&handles);
                return Err(err);
            }
        };

        self.contexts.insert(
            request_id,
            DecryptionContext {
                batch_id,
                fingerprint,
                processed: false,
            },
        );
        info!(%request_id, batch_id, "decryption requested");
        Ok(request_id)
    }

    /// Process an oracle callback. See the module docs for the gate order.
    pub fn handle_callback<B: ConfidentialCompute>(
        &mut self,
        backend: &B,
        ledger: &BatchLedger<B::Ciphertext>,
        identity: &Address,
        request_id: RequestId,
        cleartext: &[u8],
        proof: &DecryptionProof,
    ) -> PoolResult<DecryptionOutcome> {
        let context = match self.contexts.get(&request_id) {
            Some(context) if !context.processed => context,
            _ => {
                warn!(%request_id, "callback rejected: unknown or already processed");
                return Err(PoolError::Replay(request_id));
            }
        };
        let batch_id = context.batch_id;

        let batch = ledger
            .batch(batch_id)
            .ok_or(PoolError::BatchClosedOrInvalid(batch_id))?;
        let handles = batch_handles(backend, batch)?;
        if compute_fingerprint(&handles, identity) != context.fingerprint {
            warn!(%request_id, batch_id, "callback rejected: ciphertext state changed");
            return Err(PoolError::StateMismatch(request_id));
        }

        if !backend.verify_proof(request_id, cleartext, proof) {
            warn!(%request_id, batch_id, "callback rejected: invalid proof");
            return Err(PoolError::InvalidSignature(request_id));
        }

        let words = decode_cleartext_words(cleartext)?;
        let total = match words.as_slice() {
            [total] if handles.len() == 1 => *total,
            _ => {
                return Err(PoolError::MalformedCleartext(format!(
                    "expected {} word(s), got {}",
                    handles.len(),
                    words.len()
                )))
            }
        };

        if let Some(context) = self.contexts.get_mut(&request_id) {
            context.processed = true;
        }
        backend.release(&handles);
        info!(%request_id, batch_id, total, "decryption completed");
        Ok(DecryptionOutcome {
            request_id,
            batch_id,
            total,
        })
    }

    pub fn context(&self, request_id: &RequestId) -> Option<&DecryptionContext> {
        self.contexts.get(request_id)
    }

    pub fn contexts(&self) -> impl Iterator<Item = (&RequestId, &DecryptionContext)> {
        self.contexts.iter()
    }

    /// Requests still waiting for a valid callback
    pub fn pending(&self) -> impl Iterator<Item = (&RequestId, &DecryptionContext)> {
        self.contexts.iter().filter(|(_, c)| !c.processed)
    }
}
