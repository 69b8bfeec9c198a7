//! Cipherpool FHE Layer
//!
//! Encrypted contribution amounts built on TFHE-rs, plus the reference
//! decryption oracle that holds the client key and attests to revealed totals.
//!
//! # Key Features:
//! - Encrypt u64 contribution amounts (client key or public key)
//! - Homomorphic addition for pooled totals
//! - Stable content digests of ciphertexts for handle derivation
//! - Oracle-side decryption with Ed25519-signed results
//!
//! # Architecture:
//! - ClientKey: Held by the decryption oracle only
//! - ServerKey: Installed wherever totals are accumulated
//! - PublicKey: Published to providers so they can encrypt contributions

pub mod attestation;
pub mod errors;
mod real_impl;

pub use attestation::{
    decode_cleartext_words, encode_cleartext_word, verify_decryption, DecryptionSignature,
    OracleSigner, CLEARTEXT_WORD_BYTES,
};
pub use errors::FHEError;
pub use real_impl::*;

/// FHE Configuration
#[derive(Clone, Debug)]
pub struct FHEConfig {
    /// Security parameter (bits). Values below 128 select the small-encryption
    /// parameter set, which is only meant for tests.
    pub security_bits: u32,
}

impl Default for FHEConfig {
    fn default() -> Self {
        Self { security_bits: 128 }
    }
}

impl FHEConfig {
    /// Digest of the parameters, used to tag keys generated from them
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"cipherpool-fhe-config");
        hasher.update(&self.security_bits.to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// Result type for FHE operations
pub type FHEResult<T> = Result<T, FHEError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = FHEConfig::default();
        assert_eq!(config.security_bits, 128);
    }

    #[test]
    fn test_config_digest_depends_on_security() {
        let strong = FHEConfig::default();
        let weak = FHEConfig { security_bits: 64 };
        assert_ne!(strong.digest(), weak.digest());
        assert_eq!(strong.digest(), FHEConfig::default().digest());
    }
}
