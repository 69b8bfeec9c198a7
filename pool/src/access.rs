//! Role and liveness predicates
//!
//! `require_*` checks are side-effect free. Mutators are owner-gated and
//! return the event to emit, or `None` when nothing changed.

use std::collections::BTreeSet;

use tracing::debug;

use crate::errors::{PoolError, PoolResult};
use crate::events::PoolEvent;
use crate::types::Address;

/// Owner, provider set and pause flag
#[derive(Debug, Clone)]
pub struct AccessGate {
    owner: Address,
    providers: BTreeSet<Address>,
    paused: bool,
}

impl AccessGate {
    /// New gate owned by `owner`, unpaused, with no providers
    pub fn new(owner: Address) -> PoolResult<Self> {
        if owner.is_zero() {
            return Err(PoolError::InvalidParameter("owner must not be the zero address".into()));
        }
        Ok(Self {
            owner,
            providers: BTreeSet::new(),
            paused: false,
        })
    }

    pub fn require_owner(&self, caller: &Address) -> PoolResult<()> {
        if *caller != self.owner {
            debug!(%caller, "rejected: not owner");
            return Err(PoolError::NotOwner(*caller));
        }
        Ok(())
    }

    pub fn require_authorized_provider(&self, caller: &Address) -> PoolResult<()> {
        if !self.providers.contains(caller) {
            debug!(%caller, "rejected: not an authorized provider");
            return Err(PoolError::NotAuthorizedProvider(*caller));
        }
        Ok(())
    }

    pub fn require_not_paused(&self) -> PoolResult<()> {
        if self.paused {
            return Err(PoolError::Paused);
        }
        Ok(())
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_provider(&self, account: &Address) -> bool {
        self.providers.contains(account)
    }

    pub fn providers(&self) -> impl Iterator<Item = &Address> {
        self.providers.iter()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> PoolResult<PoolEvent> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(PoolError::InvalidParameter(
                "new owner must not be the zero address".into(),
            ));
        }
        let previous_owner = std::mem::replace(&mut self.owner, new_owner);
        Ok(PoolEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        })
    }

    pub fn add_provider(&mut self, caller: &Address, provider: Address) -> PoolResult<Option<PoolEvent>> {
        self.require_owner(caller)?;
        if provider.is_zero() {
            return Err(PoolError::InvalidParameter(
                "provider must not be the zero address".into(),
            ));
        }
        Ok(self
            .providers
            .insert(provider)
            .then_some(PoolEvent::ProviderAdded { provider }))
    }

    pub fn remove_provider(&mut self, caller: &Address, provider: Address) -> PoolResult<Option<PoolEvent>> {
        self.require_owner(caller)?;
        Ok(self
            .providers
            .remove(&provider)
            .then_some(PoolEvent::ProviderRemoved { provider }))
    }

    /// Set the pause flag. Always reports the resulting state, even if unchanged.
    pub fn set_paused(&mut self, caller: &Address, paused: bool) -> PoolResult<PoolEvent> {
        self.require_owner(caller)?;
        self.paused = paused;
        Ok(PoolEvent::PauseToggled { paused })
    }
}
