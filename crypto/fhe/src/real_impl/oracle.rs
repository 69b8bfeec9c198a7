//! Reference decryption oracle
//!
//! Holds the client key and the attestation key. It never sees requests
//! directly; the pool's relay hands it ciphertexts and forwards its signed
//! answers back as callbacks.

use ed25519_dalek::VerifyingKey;

use super::ciphertext::EncryptedAmount;
use super::keys::ClientKey;
use crate::attestation::{encode_cleartext_word, DecryptionSignature, OracleSigner};

/// Decrypts ciphertexts and attests to the result
pub struct DecryptionOracle {
    client_key: ClientKey,
    signer: OracleSigner,
}

impl DecryptionOracle {
    /// Create an oracle from the deployment's client key and attestation key
    pub fn new(client_key: ClientKey, signer: OracleSigner) -> Self {
        Self { client_key, signer }
    }

    /// Key the pool must trust for decryption proofs
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signer.verifying_key()
    }

    /// Decrypt a single amount
    pub fn decrypt(&self, value: &EncryptedAmount) -> u64 {
        self.client_key_decrypt(value)
    }

    /// Reveal a list of amounts for `request_id`.
    ///
    /// `None` entries stand for never-written ciphertexts and reveal as zero.
    /// Returns the cleartext payload and its attestation.
    pub fn reveal(
        &self,
        request_id: u64,
        values: &[Option<&EncryptedAmount>],
    ) -> (Vec<u8>, DecryptionSignature) {
        let mut cleartext = Vec::with_capacity(values.len() * 32);
        for value in values {
            let plain = value.map(|v| self.client_key_decrypt(v)).unwrap_or(0);
            cleartext.extend_from_slice(&encode_cleartext_word(plain));
        }
        let signature = self.signer.sign(request_id, &cleartext);
        (cleartext, signature)
    }

    /// Sign an arbitrary cleartext; used when the caller already decrypted
    pub fn attest(&self, request_id: u64, cleartext: &[u8]) -> DecryptionSignature {
        self.signer.sign(request_id, cleartext)
    }

    fn client_key_decrypt(&self, value: &EncryptedAmount) -> u64 {
        value.decrypt(&self.client_key)
    }
}

impl std::fmt::Debug for DecryptionOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionOracle")
            .field("client_key", &self.client_key)
            .field("signer", &self.signer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode_cleartext_words, verify_decryption, AmountOps, FHEConfig, FheKeySet};

    #[test]
    fn test_reveal_sum() {
        let keys = FheKeySet::generate(&FHEConfig::default()).unwrap();
        let oracle = DecryptionOracle::new(keys.client.clone(), OracleSigner::from_seed([1u8; 32]));

        let a = EncryptedAmount::encrypt_public(10, &keys.public).unwrap();
        let b = EncryptedAmount::encrypt_public(15, &keys.public).unwrap();
        let total = AmountOps::add(&a, &b, &keys.server).unwrap();

        let (cleartext, signature) = oracle.reveal(9, &[Some(&total)]);
        assert_eq!(decode_cleartext_words(&cleartext).unwrap(), vec![25]);
        assert!(verify_decryption(&oracle.verifying_key(), 9, &cleartext, &signature));
    }

    #[test]
    fn test_reveal_unwritten_as_zero() {
        let keys = FheKeySet::generate(&FHEConfig::default()).unwrap();
        let oracle = DecryptionOracle::new(keys.client, OracleSigner::generate());

        let (cleartext, _) = oracle.reveal(1, &[None]);
        assert_eq!(decode_cleartext_words(&cleartext).unwrap(), vec![0]);
    }
}
