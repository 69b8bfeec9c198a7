//! Audit trail of committed state transitions
//!
//! Events are only emitted after an operation has fully succeeded. Each one
//! is appended to an in-memory log, mirrored to `tracing`, and fanned out to
//! broadcast subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use crate::types::{Address, BatchId, CiphertextHandle, RequestId};

/// Default broadcast buffer for live subscribers
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// State-transition notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PoolEvent {
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
    ProviderAdded {
        provider: Address,
    },
    ProviderRemoved {
        provider: Address,
    },
    PauseToggled {
        paused: bool,
    },
    CooldownChanged {
        old_secs: u64,
        new_secs: u64,
    },
    BatchOpened {
        batch_id: BatchId,
    },
    BatchClosed {
        batch_id: BatchId,
    },
    ContributionSubmitted {
        provider: Address,
        batch_id: BatchId,
        handle: CiphertextHandle,
    },
    DecryptionRequested {
        request_id: RequestId,
        batch_id: BatchId,
    },
    DecryptionCompleted {
        request_id: RequestId,
        batch_id: BatchId,
        total: u64,
    },
}

impl PoolEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::OwnershipTransferred { .. } => "ownership_transferred",
            PoolEvent::ProviderAdded { .. } => "provider_added",
            PoolEvent::ProviderRemoved { .. } => "provider_removed",
            PoolEvent::PauseToggled { .. } => "pause_toggled",
            PoolEvent::CooldownChanged { .. } => "cooldown_changed",
            PoolEvent::BatchOpened { .. } => "batch_opened",
            PoolEvent::BatchClosed { .. } => "batch_closed",
            PoolEvent::ContributionSubmitted { .. } => "contribution_submitted",
            PoolEvent::DecryptionRequested { .. } => "decryption_requested",
            PoolEvent::DecryptionCompleted { .. } => "decryption_completed",
        }
    }
}

/// An event with its position in the trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    #[serde(flatten)]
    pub event: PoolEvent,
}

/// Append-only event log
#[derive(Debug)]
pub struct EventTrail {
    records: Vec<EventRecord>,
    broadcaster: broadcast::Sender<EventRecord>,
}

impl Default for EventTrail {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventTrail {
    pub fn new(capacity: usize) -> Self {
        let (broadcaster, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Vec::new(),
            broadcaster,
        }
    }

    /// Append an event and notify subscribers. Returns its sequence number.
    pub fn emit(&mut self, event: PoolEvent) -> u64 {
        let sequence = self.records.len() as u64;
        info!(target: "cipherpool::events", sequence, kind = event.name(), details = ?event, "event");

        let record = EventRecord { sequence, event };
        // No live subscribers is fine; the log keeps the record.
        let _ = self.broadcaster.send(record.clone());
        self.records.push(record);
        sequence
    }

    /// Live feed of events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.broadcaster.subscribe()
    }

    /// Every event so far
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Events with `sequence >= cursor`
    pub fn since(&self, cursor: u64) -> &[EventRecord] {
        let start = (cursor as usize).min(self.records.len());
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent event, if any
    pub fn last(&self) -> Option<&PoolEvent> {
        self.records.last().map(|r| &r.event)
    }
}
