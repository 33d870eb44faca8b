//! Storage engine interface
//!
//! The write path only needs a narrow slice of an engine: ordered inserts
//! inside an atomic transaction, a visibility marker for readers, and a
//! journal flush. Dropping a [`StorageTransaction`] without calling
//! [`StorageTransaction::commit`] aborts it.

use crate::error::StorageResult;
use crate::target::TargetKind;
use logwriter_concurrency::OperationContext;
use logwriter_core::{Entry, EntryId, Timestamp};

/// A storage engine supporting atomic multi-entry commits
pub trait StorageEngine: Send + Sync {
    /// Open a transaction on behalf of `ctx`
    ///
    /// Engines with admission control acquire the caller's admission here.
    fn begin<'a>(&'a self, ctx: &OperationContext)
        -> StorageResult<Box<dyn StorageTransaction + 'a>>;

    /// Make entries up to and including `timestamp` visible to readers
    ///
    /// With `ordered_commit` the position only ever advances; an older
    /// timestamp is ignored.
    fn register_visible_position(&self, timestamp: Timestamp, ordered_commit: bool)
        -> StorageResult<()>;

    /// Highest timestamp currently visible to readers
    fn visible_position(&self) -> Timestamp;

    /// Check whether `kind` exists
    fn has_target(&self, kind: TargetKind) -> bool;

    /// Highest id stored in `kind`, if any
    fn last_entry_id(&self, kind: TargetKind) -> StorageResult<Option<EntryId>>;

    /// Whether the engine keeps no durable journal
    fn is_ephemeral(&self) -> bool;

    /// Make everything committed so far durable
    fn flush_journal(&self) -> StorageResult<()>;
}

/// An open storage transaction
pub trait StorageTransaction {
    /// Stage `entries` for insertion into `kind` as one ordered range
    fn insert_ordered(&mut self, kind: TargetKind, entries: &[Entry]) -> StorageResult<()>;

    /// Apply every staged insert atomically
    fn commit(self: Box<Self>) -> StorageResult<()>;
}
