//! Decryption attestations
//!
//! The decryption oracle signs every revealed cleartext with Ed25519 so the
//! pool can authenticate results delivered over an untrusted transport.
//!
//! Cleartexts are a sequence of 32-byte big-endian words, one per revealed
//! ciphertext. Amounts are `u64`, so the upper 24 bytes of each word are zero.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{FHEError, FHEResult};

/// Width of one cleartext word
pub const CLEARTEXT_WORD_BYTES: usize = 32;

/// Domain separation tag for decryption attestations
const ATTESTATION_DOMAIN: &[u8] = b"CIPHERPOOL_DECRYPTION_ATTESTATION_V1";

/// Detached Ed25519 signature over a decryption result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionSignature(#[serde(with = "hex::serde")] Vec<u8>);

impl DecryptionSignature {
    /// Wrap raw signature bytes (not validated until verification)
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw signature bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn attestation_message(request_id: u64, cleartext: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(ATTESTATION_DOMAIN.len() + 8 + 32);
    message.extend_from_slice(ATTESTATION_DOMAIN);
    message.extend_from_slice(&request_id.to_be_bytes());
    message.extend_from_slice(blake3::hash(cleartext).as_bytes());
    message
}

/// Signing half of the oracle identity
pub struct OracleSigner {
    key: SigningKey,
}

impl OracleSigner {
    /// Fresh random oracle key
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic key from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(&seed),
        }
    }

    /// Public half used by verifiers
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Sign a cleartext revealed for `request_id`
    pub fn sign(&self, request_id: u64, cleartext: &[u8]) -> DecryptionSignature {
        let signature = self.key.sign(&attestation_message(request_id, cleartext));
        DecryptionSignature(signature.to_bytes().to_vec())
    }
}

impl std::fmt::Debug for OracleSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleSigner")
            .field("verifying_key", &hex::encode(self.verifying_key().as_bytes()))
            .finish()
    }
}

/// Check that `signature` attests `cleartext` as the result of `request_id`
pub fn verify_decryption(
    verifying_key: &VerifyingKey,
    request_id: u64,
    cleartext: &[u8],
    signature: &DecryptionSignature,
) -> bool {
    let Ok(signature) = Signature::from_slice(signature.as_bytes()) else {
        return false;
    };
    verifying_key
        .verify(&attestation_message(request_id, cleartext), &signature)
        .is_ok()
}

/// Encode one amount as a cleartext word
pub fn encode_cleartext_word(value: u64) -> [u8; CLEARTEXT_WORD_BYTES] {
    let mut word = [0u8; CLEARTEXT_WORD_BYTES];
    word[CLEARTEXT_WORD_BYTES - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Decode a cleartext payload into its amounts
pub fn decode_cleartext_words(cleartext: &[u8]) -> FHEResult<Vec<u64>> {
    if cleartext.is_empty() || cleartext.len() % CLEARTEXT_WORD_BYTES != 0 {
        return Err(FHEError::MalformedCleartext(format!(
            "length {} is not a positive multiple of {}",
            cleartext.len(),
            CLEARTEXT_WORD_BYTES
        )));
    }

    cleartext
        .chunks_exact(CLEARTEXT_WORD_BYTES)
        .map(|word| {
            let (high, low) = word.split_at(CLEARTEXT_WORD_BYTES - 8);
            if high.iter().any(|&b| b != 0) {
                return Err(FHEError::MalformedCleartext(
                    "word exceeds the 64-bit amount range".into(),
                ));
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(low);
            Ok(u64::from_be_bytes(bytes))
        })
        .collect()
}
