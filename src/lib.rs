//! Cipherpool: confidential batch pooling
//!
//! This is the root crate that re-exports the cipherpool components for
//! integration testing and provides the protocol defaults in one place.
//!
//! ## Architecture Overview
//!
//! Authorized providers submit encrypted amounts into time-boxed batches.
//! Only the aggregate of a closed batch is ever revealed, through an
//! asynchronous decryption oracle whose answers are checked for replay,
//! state drift and authenticity before they are accepted.
//!
//! ## Crate Organization
//!
//! - `cipherpool-fhe`: TFHE-rs encrypted amounts and the reference oracle
//! - `cipherpool-core`: access gate, rate limiter, batch ledger, decryption
//!   coordinator, event trail and the oracle relay

pub use cipherpool_core as pool;
pub use cipherpool_fhe as fhe;

/// Cipherpool protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol defaults
pub mod config {
    /// Default cooldown between two rate-limited actions of one actor (seconds)
    pub const DEFAULT_COOLDOWN_SECS: u64 = cipherpool_core::DEFAULT_COOLDOWN_SECS;

    /// Id of the batch that is open when a pool starts
    pub const FIRST_BATCH_ID: u64 = cipherpool_core::FIRST_BATCH_ID;

    /// Oracle configuration defaults
    pub mod oracle {
        /// Default FHE security parameter
        pub const DEFAULT_SECURITY_BITS: u32 = 128;

        /// Default delay before the relay delivers a callback (milliseconds)
        pub const DEFAULT_DELIVERY_DELAY_MS: u64 = 0;
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use cipherpool_core::prelude::*;
    pub use cipherpool_core::{
        MockCompute, OracleRelay, OracleResponder, PoolSnapshot, RelayConfig, RelayOutcome,
        SharedPool,
    };
    pub use cipherpool_fhe::{FHEConfig, FheKeySet, OracleSigner};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_defaults_agree() {
        assert_eq!(
            config::oracle::DEFAULT_SECURITY_BITS,
            fhe::FHEConfig::default().security_bits
        );
        assert_eq!(config::FIRST_BATCH_ID, 1);
    }
}
