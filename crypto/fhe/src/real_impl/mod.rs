//! TFHE-rs implementation

mod ciphertext;
mod keys;
mod operations;
mod oracle;

pub use ciphertext::EncryptedAmount;
pub use keys::{ClientKey, FheKeySet, PublicKey, ServerKey};
pub use operations::AmountOps;
pub use oracle::DecryptionOracle;
