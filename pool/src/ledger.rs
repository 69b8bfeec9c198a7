//! Batch ledger
//!
//! Batches are kept forever in id order. Only the current batch
//! accepts contributions, and only while it is open. Opening a new batch does
//! not close the previous one; closing is always an explicit owner decision.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::capability::ConfidentialCompute;
use crate::errors::{PoolError, PoolResult};
use crate::types::{BatchId, CiphertextHandle};

/// First batch id, opened at construction
pub const FIRST_BATCH_ID: BatchId = 1;

/// One collection window
#[derive(Debug, Clone)]
pub struct Batch<C> {
    id: BatchId,
    closed: bool,
    accumulated: Option<C>,
    contribution_count: u64,
}

impl<C> Batch<C> {
    fn open(id: BatchId) -> Self {
        Self {
            id,
            closed: false,
            accumulated: None,
            contribution_count: 0,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Encrypted running total; `None` until the first contribution
    pub fn accumulated(&self) -> Option<&C> {
        self.accumulated.as_ref()
    }

    pub fn contribution_count(&self) -> u64 {
        self.contribution_count
    }
}

/// Observer view of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub batch_id: BatchId,
    pub closed: bool,
    pub contribution_count: u64,
    /// Handle of the encrypted total, absent until the first contribution
    pub accumulated_handle: Option<CiphertextHandle>,
}

/// Owner of all batch records
#[derive(Debug, Clone)]
pub struct BatchLedger<C> {
    /// Superseded batches, index `id - 1`
    history: Vec<Batch<C>>,
    current: Batch<C>,
}

impl<C: Clone> Default for BatchLedger<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clone> BatchLedger<C> {
    /// Ledger with batch 1 open
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            current: Batch::open(FIRST_BATCH_ID),
        }
    }

    pub fn current_batch_id(&self) -> BatchId {
        self.current.id
    }

    pub fn current(&self) -> &Batch<C> {
        &self.current
    }

    pub fn batch(&self, batch_id: BatchId) -> Option<&Batch<C>> {
        if batch_id == self.current.id {
            return Some(&self.current);
        }
        let index = usize::try_from(batch_id.checked_sub(FIRST_BATCH_ID)?).ok()?;
        self.history.get(index)
    }

    /// All batches in id order
    pub fn batches(&self) -> impl Iterator<Item = &Batch<C>> {
        self.history.iter().chain(std::iter::once(&self.current))
    }

    pub fn len(&self) -> usize {
        self.history.len() + 1
    }

    /// Advance to a fresh open batch. The previous batch keeps its state.
    pub fn open_new_batch(&mut self) -> BatchId {
        let id = self.current.id + 1;
        let previous = std::mem::replace(&mut self.current, Batch::open(id));
        self.history.push(previous);
        info!(batch_id = id, "batch opened");
        id
    }

    /// Close the current batch. Closing twice is an error.
    pub fn close_current_batch(&mut self) -> PoolResult<BatchId> {
        let id = self.ensure_current_open()?;
        self.current.closed = true;
        info!(batch_id = id, "batch closed");
        Ok(id)
    }

    /// Close a superseded batch that was left open, or the current one.
    pub fn close_batch(&mut self, batch_id: BatchId) -> PoolResult<BatchId> {
        let batch = if batch_id == self.current.id {
            &mut self.current
        } else {
            batch_id
                .checked_sub(FIRST_BATCH_ID)
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| self.history.get_mut(i))
                .ok_or(PoolError::BatchClosedOrInvalid(batch_id))?
        };
        if batch.closed {
            return Err(PoolError::BatchClosedOrInvalid(batch_id));
        }
        batch.closed = true;
        info!(batch_id, "batch closed");
        Ok(batch_id)
    }

    /// Id of the current batch if it still accepts contributions
    pub fn ensure_current_open(&self) -> PoolResult<BatchId> {
        if self.current.closed {
            return Err(PoolError::BatchClosedOrInvalid(self.current.id));
        }
        Ok(self.current.id)
    }

    /// A batch that can be decrypted: non-zero id, exists, closed
    pub fn closed_batch(&self, batch_id: BatchId) -> PoolResult<&Batch<C>> {
        match self.batch(batch_id) {
            Some(batch) if batch.closed => Ok(batch),
            _ => Err(PoolError::BatchClosedOrInvalid(batch_id)),
        }
    }

    /// Fold `amount` into the current batch.
    ///
    /// The first contribution becomes the total as is; later ones are added
    /// homomorphically. Nothing is written if the addition fails.
    pub fn accumulate<B>(&mut self, backend: &B, amount: C) -> PoolResult<(BatchId, u64)>
    where
        B: ConfidentialCompute<Ciphertext = C>,
    {
        let batch_id = self.ensure_current_open()?;

        let next_total = match self.current.accumulated.as_ref() {
            None => amount,
            Some(total) => backend.add(total, &amount)?,
        };

        self.current.accumulated = Some(next_total);
        self.current.contribution_count += 1;
        Ok((batch_id, self.current.contribution_count))
    }

    /// Observer view of `batch_id`
    pub fn info<B>(&self, backend: &B, batch_id: BatchId) -> PoolResult<Option<BatchInfo>>
    where
        B: ConfidentialCompute<Ciphertext = C>,
    {
        let Some(batch) = self.batch(batch_id) else {
            return Ok(None);
        };
        let accumulated_handle = batch
            .accumulated
            .as_ref()
            .map(|c| backend.to_handle(c))
            .transpose()?;
        Ok(Some(BatchInfo {
            batch_id,
            closed: batch.closed,
            contribution_count: batch.contribution_count,
            accumulated_handle,
        }))
    }
}
