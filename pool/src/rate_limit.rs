//! Per-actor cooldowns
//!
//! Submissions and decryption requests are tracked independently. A
//! timestamp is only written once the enclosing operation has succeeded;
//! [`RateLimiter::check`] never mutates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{PoolError, PoolResult};
use crate::types::Address;

/// Operation classes subject to cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitedAction {
    Submission,
    DecryptionRequest,
}

impl std::fmt::Display for RateLimitedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitedAction::Submission => write!(f, "submission"),
            RateLimitedAction::DecryptionRequest => write!(f, "decryption request"),
        }
    }
}

/// Cooldown tracker
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    cooldown_secs: u64,
    last_submission: HashMap<Address, u64>,
    last_decryption_request: HashMap<Address, u64>,
}

impl RateLimiter {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown_secs,
            ..Default::default()
        }
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.cooldown_secs
    }

    /// Replace the cooldown, returning the previous value
    pub fn set_cooldown(&mut self, cooldown_secs: u64) -> u64 {
        std::mem::replace(&mut self.cooldown_secs, cooldown_secs)
    }

    fn table(&self, action: RateLimitedAction) -> &HashMap<Address, u64> {
        match action {
            RateLimitedAction::Submission => &self.last_submission,
            RateLimitedAction::DecryptionRequest => &self.last_decryption_request,
        }
    }

    fn table_mut(&mut self, action: RateLimitedAction) -> &mut HashMap<Address, u64> {
        match action {
            RateLimitedAction::Submission => &mut self.last_submission,
            RateLimitedAction::DecryptionRequest => &mut self.last_decryption_request,
        }
    }

    /// Reject `actor` if its last `action` was less than the cooldown ago.
    ///
    /// An actor that never performed `action` is never blocked.
    pub fn check(&self, action: RateLimitedAction, actor: &Address, now: u64) -> PoolResult<()> {
        let Some(&last) = self.table(action).get(actor) else {
            return Ok(());
        };

        let elapsed = now.saturating_sub(last);
        if elapsed < self.cooldown_secs {
            let remaining_secs = self.cooldown_secs - elapsed;
            debug!(%actor, %action, remaining_secs, "cooldown active");
            return Err(PoolError::CooldownActive {
                action,
                remaining_secs,
            });
        }
        Ok(())
    }

    /// Record a successful `action` at `now`. Timestamps never move backwards.
    pub fn record(&mut self, action: RateLimitedAction, actor: Address, now: u64) {
        let entry = self.table_mut(action).entry(actor).or_insert(now);
        *entry = (*entry).max(now);
    }

    /// Last recorded time of `action` by `actor`, if any
    pub fn last_action(&self, action: RateLimitedAction, actor: &Address) -> Option<u64> {
        self.table(action).get(actor).copied()
    }

    /// All recorded timestamps for `action`
    pub fn entries(&self, action: RateLimitedAction) -> impl Iterator<Item = (&Address, &u64)> {
        self.table(action).iter()
    }
}
