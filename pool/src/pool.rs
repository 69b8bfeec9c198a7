//! Confidential pool
//!
//! Wires the access gate, rate limiter, batch ledger, decryption coordinator
//! and event trail together. Every mutating entry point runs its gates in the
//! same order (authorization, pause, cooldown, lifecycle, capability) and
//! only commits, records cooldowns and emits events once all of them passed.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::access::AccessGate;
use crate::capability::{ConfidentialCompute, DecryptionProof};
use crate::decryption::{DecryptionContext, DecryptionCoordinator};
use crate::errors::{PoolError, PoolResult};
use crate::events::{EventRecord, EventTrail, PoolEvent, DEFAULT_EVENT_CAPACITY};
use crate::ledger::{BatchInfo, BatchLedger};
use crate::rate_limit::{RateLimitedAction, RateLimiter};
use crate::types::{Address, BatchId, CallContext, RequestId};
use crate::DEFAULT_COOLDOWN_SECS;

/// Construction parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub owner: Address,
    /// Deployment identity bound into every fingerprint
    pub identity: Address,
    pub providers: Vec<Address>,
    pub cooldown_secs: u64,
    pub start_paused: bool,
    pub event_capacity: usize,
}

impl PoolConfig {
    pub fn new(owner: Address, identity: Address) -> Self {
        Self {
            owner,
            identity,
            providers: Vec::new(),
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            start_paused: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn with_provider(mut self, provider: Address) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_providers(mut self, providers: impl IntoIterator<Item = Address>) -> Self {
        self.providers.extend(providers);
        self
    }

    pub fn with_cooldown(mut self, cooldown_secs: u64) -> Self {
        self.cooldown_secs = cooldown_secs;
        self
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.start_paused = paused;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Serializable view of everything an observer can query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub identity: Address,
    pub owner: Address,
    pub providers: Vec<Address>,
    pub paused: bool,
    pub cooldown_secs: u64,
    pub current_batch_id: BatchId,
    pub batches: Vec<BatchInfo>,
    pub decryptions: Vec<(RequestId, DecryptionContext)>,
    pub last_submissions: Vec<(Address, u64)>,
    pub last_decryption_requests: Vec<(Address, u64)>,
}

/// The pool state machine over a confidential-compute backend
pub struct ConfidentialPool<B: ConfidentialCompute> {
    identity: Address,
    gate: AccessGate,
    limiter: RateLimiter,
    ledger: BatchLedger<B::Ciphertext>,
    coordinator: DecryptionCoordinator,
    trail: EventTrail,
    backend: B,
}

impl<B: ConfidentialCompute> ConfidentialPool<B> {
    /// Build a pool with batch 1 open.
    pub fn new(config: PoolConfig, backend: B) -> PoolResult<Self> {
        if config.identity.is_zero() {
            return Err(PoolError::InvalidParameter(
                "pool identity must not be the zero address".into(),
            ));
        }
        let owner = config.owner;
        let mut gate = AccessGate::new(owner)?;
        let mut trail = EventTrail::new(config.event_capacity);

        trail.emit(PoolEvent::OwnershipTransferred {
            previous_owner: Address::ZERO,
            new_owner: owner,
        });
        for provider in config.providers {
            if let Some(event) = gate.add_provider(&owner, provider)? {
                trail.emit(event);
            }
        }
        if config.start_paused {
            trail.emit(gate.set_paused(&owner, true)?);
        }

        let ledger = BatchLedger::new();
        trail.emit(PoolEvent::BatchOpened {
            batch_id: ledger.current_batch_id(),
        });

        info!(
            identity = %config.identity,
            owner = %owner,
            cooldown_secs = config.cooldown_secs,
            "pool initialized"
        );

        Ok(Self {
            identity: config.identity,
            gate,
            limiter: RateLimiter::new(config.cooldown_secs),
            ledger,
            coordinator: DecryptionCoordinator::new(),
            trail,
            backend,
        })
    }

    // ---- owner operations ----

    pub fn transfer_ownership(&mut self, ctx: &CallContext, new_owner: Address) -> PoolResult<()> {
        let event = self.gate.transfer_ownership(&ctx.caller, new_owner)?;
        self.trail.emit(event);
        Ok(())
    }

    /// Authorize `provider`. Re-adding is a silent no-op.
    pub fn add_provider(&mut self, ctx: &CallContext, provider: Address) -> PoolResult<()> {
        if let Some(event) = self.gate.add_provider(&ctx.caller, provider)? {
            self.trail.emit(event);
        }
        Ok(())
    }

    /// Revoke `provider`. Removing an unknown account is a silent no-op.
    pub fn remove_provider(&mut self, ctx: &CallContext, provider: Address) -> PoolResult<()> {
        if let Some(event) = self.gate.remove_provider(&ctx.caller, provider)? {
            self.trail.emit(event);
        }
        Ok(())
    }

    pub fn set_paused(&mut self, ctx: &CallContext, paused: bool) -> PoolResult<()> {
        let event = self.gate.set_paused(&ctx.caller, paused)?;
        self.trail.emit(event);
        Ok(())
    }

    pub fn set_cooldown(&mut self, ctx: &CallContext, cooldown_secs: u64) -> PoolResult<()> {
        self.gate.require_owner(&ctx.caller)?;
        let old_secs = self.limiter.set_cooldown(cooldown_secs);
        self.trail.emit(PoolEvent::CooldownChanged {
            old_secs,
            new_secs: cooldown_secs,
        });
        Ok(())
    }

    /// Advance to a new batch. The previous one is left as is, open or not.
    pub fn open_new_batch(&mut self, ctx: &CallContext) -> PoolResult<BatchId> {
        self.gate.require_owner(&ctx.caller)?;
        self.gate.require_not_paused()?;
        let batch_id = self.ledger.open_new_batch();
        self.trail.emit(PoolEvent::BatchOpened { batch_id });
        Ok(batch_id)
    }

    pub fn close_current_batch(&mut self, ctx: &CallContext) -> PoolResult<BatchId> {
        self.gate.require_owner(&ctx.caller)?;
        self.gate.require_not_paused()?;
        let batch_id = self.ledger.close_current_batch()?;
        self.trail.emit(PoolEvent::BatchClosed { batch_id });
        Ok(batch_id)
    }

    /// Close any open batch, including ones superseded by [`Self::open_new_batch`].
    pub fn close_batch(&mut self, ctx: &CallContext, batch_id: BatchId) -> PoolResult<BatchId> {
        self.gate.require_owner(&ctx.caller)?;
        self.gate.require_not_paused()?;
        let batch_id = self.ledger.close_batch(batch_id)?;
        self.trail.emit(PoolEvent::BatchClosed { batch_id });
        Ok(batch_id)
    }

    // ---- provider operations ----

    /// Fold an encrypted amount into the current batch.
    pub fn submit_contribution(
        &mut self,
        ctx: &CallContext,
        amount: B::Ciphertext,
    ) -> PoolResult<BatchId> {
        let provider = ctx.caller;
        self.gate.require_authorized_provider(&provider)?;
        self.gate.require_not_paused()?;
        self.limiter
            .check(RateLimitedAction::Submission, &provider, ctx.timestamp)?;
        self.ledger.ensure_current_open()?;
        self.backend.ensure_ready()?;

        let handle = self.backend.to_handle(&amount)?;
        let (batch_id, count) = self.ledger.accumulate(&self.backend, amount)?;

        self.limiter
            .record(RateLimitedAction::Submission, provider, ctx.timestamp);
        debug!(%provider, batch_id, count, "contribution accumulated");
        self.trail.emit(PoolEvent::ContributionSubmitted {
            provider,
            batch_id,
            handle,
        });
        Ok(batch_id)
    }

    /// Ask the oracle to reveal the total of a closed batch. The result
    /// arrives later through [`Self::handle_callback`].
    pub fn request_decryption(&mut self, ctx: &CallContext, batch_id: BatchId) -> PoolResult<RequestId> {
        let provider = ctx.caller;
        self.gate.require_authorized_provider(&provider)?;
        self.gate.require_not_paused()?;
        self.limiter
            .check(RateLimitedAction::DecryptionRequest, &provider, ctx.timestamp)?;
        self.ledger.closed_batch(batch_id)?;
        self.backend.ensure_ready()?;

        let request_id =
            self.coordinator
                .request(&mut self.backend, &self.ledger, &self.identity, batch_id)?;

        self.limiter
            .record(RateLimitedAction::DecryptionRequest, provider, ctx.timestamp);
        self.trail.emit(PoolEvent::DecryptionRequested {
            request_id,
            batch_id,
        });
        Ok(request_id)
    }

    // ---- oracle entry point ----

    /// Oracle callback. Open to anyone; authenticity comes from `proof`.
    /// Returns the revealed total.
    pub fn handle_callback(
        &mut self,
        request_id: RequestId,
        cleartext: &[u8],
        proof: &DecryptionProof,
    ) -> PoolResult<u64> {
        let outcome = self.coordinator.handle_callback(
            &self.backend,
            &self.ledger,
            &self.identity,
            request_id,
            cleartext,
            proof,
        )?;
        self.trail.emit(PoolEvent::DecryptionCompleted {
            request_id: outcome.request_id,
            batch_id: outcome.batch_id,
            total: outcome.total,
        });
        Ok(outcome.total)
    }

    // ---- queries ----

    pub fn identity(&self) -> Address {
        self.identity
    }

    pub fn owner(&self) -> Address {
        self.gate.owner()
    }

    pub fn is_provider(&self, account: &Address) -> bool {
        self.gate.is_provider(account)
    }

    pub fn providers(&self) -> Vec<Address> {
        self.gate.providers().copied().collect()
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn cooldown_secs(&self) -> u64 {
        self.limiter.cooldown_secs()
    }

    pub fn current_batch_id(&self) -> BatchId {
        self.ledger.current_batch_id()
    }

    /// Observer view of a batch, `None` if it never existed
    pub fn batch(&self, batch_id: BatchId) -> PoolResult<Option<BatchInfo>> {
        self.ledger.info(&self.backend, batch_id)
    }

    pub fn ledger(&self) -> &BatchLedger<B::Ciphertext> {
        &self.ledger
    }

    pub fn decryption_context(&self, request_id: RequestId) -> Option<&DecryptionContext> {
        self.coordinator.context(&request_id)
    }

    pub fn last_submission(&self, actor: &Address) -> Option<u64> {
        self.limiter.last_action(RateLimitedAction::Submission, actor)
    }

    pub fn last_decryption_request(&self, actor: &Address) -> Option<u64> {
        self.limiter
            .last_action(RateLimitedAction::DecryptionRequest, actor)
    }

    pub fn snapshot(&self) -> PoolResult<PoolSnapshot> {
        let batches = self
            .ledger
            .batches()
            .map(|batch| self.ledger.info(&self.backend, batch.id()))
            .filter_map(Result::transpose)
            .collect::<PoolResult<Vec<_>>>()?;

        let entries = |action: RateLimitedAction| {
            let mut entries: Vec<_> = self
                .limiter
                .entries(action)
                .map(|(actor, at)| (*actor, *at))
                .collect();
            entries.sort();
            entries
        };

        Ok(PoolSnapshot {
            identity: self.identity,
            owner: self.owner(),
            providers: self.providers(),
            paused: self.is_paused(),
            cooldown_secs: self.cooldown_secs(),
            current_batch_id: self.current_batch_id(),
            batches,
            decryptions: self
                .coordinator
                .contexts()
                .map(|(id, context)| (*id, context.clone()))
                .collect(),
            last_submissions: entries(RateLimitedAction::Submission),
            last_decryption_requests: entries(RateLimitedAction::DecryptionRequest),
        })
    }

    // ---- events ----

    pub fn events(&self) -> &[EventRecord] {
        self.trail.records()
    }

    /// Events with a sequence number at or after `cursor`
    pub fn events_since(&self, cursor: u64) -> &[EventRecord] {
        self.trail.since(cursor)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.trail.subscribe()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
