//! FHE Error types

use thiserror::Error;

/// Errors that can occur during FHE operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FHEError {
    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Invalid ciphertext
    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Key material does not match the expected parameters
    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    /// Cleartext payload could not be decoded
    #[error("Malformed cleartext: {0}")]
    MalformedCleartext(String),
}
