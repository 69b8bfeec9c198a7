//! Cipherpool Core
//!
//! Confidential pooling of encrypted contributions into batches, with
//! aggregate-only disclosure through an asynchronous decryption oracle.
//!
//! # Key Features:
//! - Owner/provider access gate with a global pause switch
//! - Per-actor cooldowns for submissions and decryption requests
//! - Append-only batch ledger accumulating encrypted totals
//! - Decryption coordinator with replay, state-drift and proof checks
//! - Event trail for off-chain observers
//!
//! # Architecture:
//! - ConfidentialCompute: encrypted arithmetic and oracle, behind a trait
//! - MockCompute: plaintext-passthrough backend for tests and simulation
//! - FheCompute: TFHE-backed backend
//! - OracleRelay: tokio task carrying oracle answers back as callbacks

pub mod access;
pub mod capability;
pub mod decryption;
pub mod errors;
pub mod events;
pub mod fhe_backend;
pub mod ledger;
pub mod mock;
pub mod pool;
pub mod rate_limit;
pub mod relay;
pub mod types;

pub use access::AccessGate;
pub use capability::{ConfidentialCompute, DecryptionJob, DecryptionProof, JobQueue};
pub use decryption::{compute_fingerprint, DecryptionContext, DecryptionCoordinator, DecryptionOutcome};
pub use errors::{ErrorCategory, PoolError, PoolResult};
pub use events::{EventRecord, EventTrail, PoolEvent};
pub use fhe_backend::{FheCompute, FheResponder};
pub use ledger::{Batch, BatchInfo, BatchLedger, FIRST_BATCH_ID};
pub use mock::{MockCiphertext, MockCompute, MockOracle};
pub use pool::{ConfidentialPool, PoolConfig, PoolSnapshot};
pub use rate_limit::{RateLimitedAction, RateLimiter};
pub use relay::{OracleRelay, OracleResponder, OracleResponse, RelayConfig, RelayOutcome, SharedPool};
pub use types::{Address, BatchId, CallContext, CallbackSelector, CiphertextHandle, Fingerprint, RequestId};

/// Cooldown applied when none is configured (seconds)
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;

pub mod prelude {
    pub use crate::{
        Address, BatchId, CallContext, ConfidentialCompute, ConfidentialPool, PoolConfig, PoolError,
        PoolEvent, PoolResult, RequestId,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_default_cooldown() {
        let config = PoolConfig::new(Address::from_bytes([1; 32]), Address::from_bytes([2; 32]));
        assert_eq!(config.cooldown_secs, DEFAULT_COOLDOWN_SECS);
        assert!(config.providers.is_empty());
        assert!(!config.start_paused);
    }
}
