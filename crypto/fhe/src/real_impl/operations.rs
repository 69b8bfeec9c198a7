//! Homomorphic operations on encrypted amounts
//!
//! Run wherever contributions are pooled; only the server key is needed.

use super::ciphertext::EncryptedAmount;
use super::keys::ServerKey;
use crate::FHEResult;

/// Operations over [`EncryptedAmount`] using the server key
pub struct AmountOps;

impl AmountOps {
    /// Homomorphic addition. Wraps modulo 2^64 like the underlying integer type.
    pub fn add(
        a: &EncryptedAmount,
        b: &EncryptedAmount,
        server_key: &ServerKey,
    ) -> FHEResult<EncryptedAmount> {
        server_key.install();
        let result = a.inner() + b.inner();
        Ok(EncryptedAmount::from_tfhe_with_ops(
            result,
            a.op_count().saturating_add(b.op_count()).saturating_add(1),
        ))
    }

    /// Sum a non-empty slice of amounts
    pub fn sum(values: &[EncryptedAmount], server_key: &ServerKey) -> FHEResult<Option<EncryptedAmount>> {
        let mut iter = values.iter();
        let Some(first) = iter.next() else {
            return Ok(None);
        };
        let mut total = first.clone();
        for value in iter {
            total = Self::add(&total, value, server_key)?;
        }
        Ok(Some(total))
    }
}
