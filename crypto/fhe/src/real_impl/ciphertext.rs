//! Encrypted contribution amounts
//!
//! `EncryptedAmount` wraps a TFHE-rs `FheUint64` together with an operation
//! counter used as a noise proxy.

use tfhe::prelude::*;
use tfhe::FheUint64;

use super::keys::{ClientKey, PublicKey};
use crate::{FHEError, FHEResult};

/// Domain tag mixed into ciphertext digests
const DIGEST_DOMAIN: &[u8] = b"cipherpool-fhe-ciphertext-v1";

/// Encrypted 64-bit unsigned amount
#[derive(Clone)]
pub struct EncryptedAmount {
    inner: FheUint64,
    op_count: u32,
}

impl EncryptedAmount {
    /// Encrypt with the client key
    pub fn encrypt(value: u64, client_key: &ClientKey) -> FHEResult<Self> {
        let inner = FheUint64::try_encrypt(value, client_key.inner())
            .map_err(|e| FHEError::EncryptionFailed(e.to_string()))?;
        Ok(Self { inner, op_count: 0 })
    }

    /// Encrypt with the published public key (provider side)
    pub fn encrypt_public(value: u64, public_key: &PublicKey) -> FHEResult<Self> {
        let inner = FheUint64::try_encrypt(value, public_key.inner())
            .map_err(|e| FHEError::EncryptionFailed(e.to_string()))?;
        Ok(Self { inner, op_count: 0 })
    }

    pub(crate) fn decrypt(&self, client_key: &ClientKey) -> u64 {
        self.inner.decrypt(client_key.inner())
    }

    pub(crate) fn from_tfhe_with_ops(inner: FheUint64, op_count: u32) -> Self {
        Self { inner, op_count }
    }

    pub(crate) fn inner(&self) -> &FheUint64 {
        &self.inner
    }

    /// Number of homomorphic operations folded into this value
    pub fn op_count(&self) -> u32 {
        self.op_count
    }

    /// Serialize for storage or transmission
    pub fn to_bytes(&self) -> FHEResult<Vec<u8>> {
        bincode::serialize(&self.inner).map_err(|e| FHEError::SerializationError(e.to_string()))
    }

    /// Deserialize a value produced by [`EncryptedAmount::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> FHEResult<Self> {
        if bytes.is_empty() {
            return Err(FHEError::InvalidCiphertext("empty ciphertext".into()));
        }
        let inner: FheUint64 =
            bincode::deserialize(bytes).map_err(|e| FHEError::SerializationError(e.to_string()))?;
        Ok(Self { inner, op_count: 0 })
    }

    /// Content digest of the serialized ciphertext.
    ///
    /// Equal ciphertexts always produce equal digests; the digest reveals
    /// nothing about the plaintext.
    pub fn digest(&self) -> FHEResult<[u8; 32]> {
        let bytes = self.to_bytes()?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_DOMAIN);
        hasher.update(&bytes);
        Ok(*hasher.finalize().as_bytes())
    }
}

impl std::fmt::Debug for EncryptedAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedAmount")
            .field("value", &"<encrypted>")
            .field("ops", &self.op_count)
            .finish()
    }
}
