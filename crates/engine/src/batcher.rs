//! Batch extraction from the inbound buffer

use logwriter_concurrency::{BoundedBuffer, ShutdownSignal};
use logwriter_core::{Entry, EntryId, EntryIdAndWallTime, Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Entries pulled from the inbound buffer in one call
#[derive(Debug, Clone)]
pub struct Batch {
    entries: Vec<Entry>,
    exhausted: bool,
}

impl Batch {
    /// Create a batch
    pub fn new(entries: Vec<Entry>, exhausted: bool) -> Self {
        Self { entries, exhausted }
    }

    /// Create a batch with no entries
    pub fn empty(exhausted: bool) -> Self {
        Self::new(Vec::new(), exhausted)
    }

    /// Whether the inbound buffer was empty right after the pull
    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    /// Check if the batch holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in arrival order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Id of the last entry
    pub fn last_id(&self) -> Option<EntryId> {
        self.entries.last().map(Entry::id)
    }

    /// Id and wall time of the last entry
    pub fn last_id_and_wall_time(&self) -> Option<EntryIdAndWallTime> {
        self.entries.last().map(Entry::id_and_wall_time)
    }

    /// Total payload size in bytes
    pub fn byte_size(&self) -> usize {
        self.entries.iter().map(Entry::size).sum()
    }

    /// Check that ids are strictly increasing and return the maximum
    pub fn validate_order(&self) -> Result<EntryId> {
        for pair in self.entries.windows(2) {
            if pair[1].id() <= pair[0].id() {
                return Err(Error::OutOfOrder {
                    previous: pair[0].id(),
                    next: pair[1].id(),
                });
            }
        }
        self.last_id()
            .ok_or_else(|| Error::Internal("empty batch has no maximum id".into()))
    }

    /// Take the entries
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

/// Pulls batches from the inbound buffer
#[derive(Debug)]
pub struct Batcher {
    inbound: Arc<BoundedBuffer<Entry>>,
    max_entries: usize,
    shutdown: ShutdownSignal,
}

impl Batcher {
    /// Create a batcher taking at most `max_entries` per batch
    pub fn new(inbound: Arc<BoundedBuffer<Entry>>, max_entries: usize, shutdown: ShutdownSignal) -> Self {
        Self {
            inbound,
            max_entries: max_entries.max(1),
            shutdown,
        }
    }

    /// Wait up to `max_wait` and return every entry available
    ///
    /// Returns an empty batch on timeout or once shutdown is requested with
    /// nothing buffered.
    pub fn get_next_batch(&self, max_wait: Duration) -> Batch {
        self.get_next_batch_up_to(max_wait, self.max_entries)
    }

    /// Like [`Batcher::get_next_batch`], taking at most `limit` entries
    pub fn get_next_batch_up_to(&self, max_wait: Duration, limit: usize) -> Batch {
        match self
            .inbound
            .pop_batch(max_wait, self.max_entries.min(limit), &self.shutdown)
        {
            Ok(popped) => Batch::new(popped.items, popped.exhausted),
            Err(_) => Batch::empty(self.inbound.is_empty()),
        }
    }

    /// Entries waiting in the inbound buffer
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }

    /// Return a batch's entries to the head of the inbound buffer
    pub fn requeue(&self, batch: Batch) {
        let entries = batch.into_entries();
        if !entries.is_empty() {
            tracing::info!(entries = entries.len(), "Returning unpersisted batch to inbound buffer");
            self.inbound.requeue_front(entries);
        }
    }
}
