//! Identifiers and call metadata shared across the pool

use serde::{Deserialize, Serialize};

use crate::errors::{PoolError, PoolResult};

/// Batch identifier. Batch 1 is opened at construction; 0 is never valid.
pub type BatchId = u64;

/// 32-byte account identity (owner, providers, pool deployment)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(#[serde(with = "hex::serde")] [u8; 32]);

impl Address {
    /// The unset address
    pub const ZERO: Address = Address([0u8; 32]);

    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the unset address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Full hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string (optional `0x` prefix)
    pub fn from_hex(s: &str) -> PoolResult<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)
            .map_err(|e| PoolError::InvalidParameter(format!("address hex: {}", e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            PoolError::InvalidParameter(format!("address must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Decryption request identifier, issued by the oracle capability
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::fmt::Debug for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

/// Opaque reference to an encrypted value
///
/// Comparable and hashable, never decryptable by the pool itself.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CiphertextHandle(#[serde(with = "hex::serde")] [u8; 32]);

impl CiphertextHandle {
    /// Handle of a never-written encrypted value
    pub const ZERO: CiphertextHandle = CiphertextHandle([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl std::fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &hex::encode(self.0)[..16])
    }
}

impl std::fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CiphertextHandle({})", self)
    }
}

/// Digest binding a set of ciphertext handles to one pool deployment
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(#[serde(with = "hex::serde")] [u8; 32]);

impl Fingerprint {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", &hex::encode(self.0)[..16])
    }
}

/// Name of the entry point a decryption result must be delivered to
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CallbackSelector(&'static str);

impl CallbackSelector {
    /// [`crate::ConfidentialPool::handle_callback`]
    pub const HANDLE_CALLBACK: CallbackSelector = CallbackSelector("handle_callback");

    pub fn name(&self) -> &'static str {
        self.0
    }
}

/// Who is calling and when
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// Caller identity
    pub caller: Address,
    /// Wall-clock seconds at the time of the call
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}
