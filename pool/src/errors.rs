//! Pool error types
//!
//! Every rejected operation maps to exactly one named variant, so callers
//! can tell "try again later" from "never going to work" from "the data is
//! wrong".

use cipherpool_fhe::FHEError;
use thiserror::Error;

use crate::rate_limit::RateLimitedAction;
use crate::types::{Address, BatchId, RequestId};

/// Errors returned by pool operations. A failed operation leaves no trace:
/// no state change, no cooldown update, no event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    // Authorization
    #[error("Caller {0} is not the owner")]
    NotOwner(Address),

    #[error("Caller {0} is not an authorized provider")]
    NotAuthorizedProvider(Address),

    // Availability
    #[error("System is paused")]
    Paused,

    #[error("Encryption subsystem unavailable: {0}")]
    EncryptionUnavailable(String),

    // Rate limiting
    #[error("Cooldown active for {action}: {remaining_secs}s remaining")]
    CooldownActive {
        action: RateLimitedAction,
        remaining_secs: u64,
    },

    // Lifecycle
    #[error("Batch {0} is closed or invalid")]
    BatchClosedOrInvalid(BatchId),

    // Integrity
    #[error("Ciphertext state changed since decryption request {0}")]
    StateMismatch(RequestId),

    // Authenticity
    #[error("Invalid decryption signature for request {0}")]
    InvalidSignature(RequestId),

    // Replay
    #[error("Decryption request {0} is unknown or already processed")]
    Replay(RequestId),

    // Input
    #[error("Malformed cleartext: {0}")]
    MalformedCleartext(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Collaborator
    #[error("Capability error: {0}")]
    Capability(String),
}

/// Coarse classification of [`PoolError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Authorization,
    Availability,
    RateLimit,
    Lifecycle,
    Integrity,
    Authenticity,
    Replay,
    Input,
    Collaborator,
}

impl PoolError {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            PoolError::NotOwner(_) | PoolError::NotAuthorizedProvider(_) => {
                ErrorCategory::Authorization
            }
            PoolError::Paused | PoolError::EncryptionUnavailable(_) => ErrorCategory::Availability,
            PoolError::CooldownActive { .. } => ErrorCategory::RateLimit,
            PoolError::BatchClosedOrInvalid(_) => ErrorCategory::Lifecycle,
            PoolError::StateMismatch(_) => ErrorCategory::Integrity,
            PoolError::InvalidSignature(_) => ErrorCategory::Authenticity,
            PoolError::Replay(_) => ErrorCategory::Replay,
            PoolError::MalformedCleartext(_) | PoolError::InvalidParameter(_) => {
                ErrorCategory::Input
            }
            PoolError::Capability(_) => ErrorCategory::Collaborator,
        }
    }

    /// Whether the same call may succeed later without anyone fixing anything
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Availability
        )
    }
}

impl From<FHEError> for PoolError {
    fn from(e: FHEError) -> Self {
        match e {
            FHEError::MalformedCleartext(msg) => PoolError::MalformedCleartext(msg),
            other => PoolError::Capability(other.to_string()),
        }
    }
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_distinct() {
        let caller = Address::from_bytes([9; 32]);
        assert_eq!(PoolError::NotOwner(caller).category(), ErrorCategory::Authorization);
        assert_eq!(PoolError::Paused.category(), ErrorCategory::Availability);
        assert_eq!(
            PoolError::BatchClosedOrInvalid(1).category(),
            ErrorCategory::Lifecycle
        );
        assert_eq!(
            PoolError::StateMismatch(RequestId::new(1)).category(),
            ErrorCategory::Integrity
        );
        assert_eq!(
            PoolError::InvalidSignature(RequestId::new(1)).category(),
            ErrorCategory::Authenticity
        );
        assert_eq!(PoolError::Replay(RequestId::new(1)).category(), ErrorCategory::Replay);
    }

    #[test]
    fn test_retryable() {
        let cooldown = PoolError::CooldownActive {
            action: RateLimitedAction::Submission,
            remaining_secs: 5,
        };
        assert!(cooldown.is_retryable());
        assert!(PoolError::Paused.is_retryable());
        assert!(!PoolError::BatchClosedOrInvalid(2).is_retryable());
        assert!(!PoolError::Replay(RequestId::new(3)).is_retryable());
    }

    #[test]
    fn test_from_fhe_error() {
        let err: PoolError = FHEError::MalformedCleartext("short".into()).into();
        assert_eq!(err, PoolError::MalformedCleartext("short".into()));

        let err: PoolError = FHEError::SerializationError("boom".into()).into();
        assert!(matches!(err, PoolError::Capability(_)));
    }

    #[test]
    fn test_display() {
        let err = PoolError::CooldownActive {
            action: RateLimitedAction::DecryptionRequest,
            remaining_secs: 12,
        };
        assert_eq!(err.to_string(), "Cooldown active for decryption request: 12s remaining");
    }
}
