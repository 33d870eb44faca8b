//! Write targets
//!
//! A batch is persisted to one or two destinations:
//!
//! | Target | Namespace | Required |
//! |--------|-----------|----------|
//! | Log store | `local.log` | Yes (authoritative) |
//! | Change feed | `config.changes` | Only when the deployment enables it |
//!
//! Each destination is written in its own transaction. A crash between
//! the two leaves the change feed behind the log store, which replay from
//! the log store repairs.

use crate::engine::StorageEngine;
use crate::error::{StorageError, StorageResult};
use logwriter_concurrency::OperationContext;
use logwriter_core::Entry;
use std::fmt;

/// Identifies a storage destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetKind {
    /// Authoritative log store
    LogStore,
    /// Auxiliary change feed
    ChangeFeed,
}

impl TargetKind {
    /// Namespace the target is stored under
    pub fn namespace(&self) -> &'static str {
        match self {
            TargetKind::LogStore => "local.log",
            TargetKind::ChangeFeed => "config.changes",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace())
    }
}

/// Writes one contiguous, ordered range of entries in one transaction
pub type WriteRangeFn = fn(&OperationContext, &dyn StorageEngine, &[Entry]) -> StorageResult<()>;

/// A destination plus the function that writes a range of a batch to it
#[derive(Clone, Copy)]
pub struct WriteTarget {
    kind: TargetKind,
    write_range: WriteRangeFn,
}

impl WriteTarget {
    /// Create a target with a custom write function
    pub fn new(kind: TargetKind, write_range: WriteRangeFn) -> Self {
        Self { kind, write_range }
    }

    /// The authoritative log store
    pub fn log_store() -> Self {
        Self::new(TargetKind::LogStore, write_log_store_range)
    }

    /// The auxiliary change feed
    pub fn change_feed() -> Self {
        Self::new(TargetKind::ChangeFeed, write_change_feed_range)
    }

    /// Which destination this is
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Namespace of the destination
    pub fn namespace(&self) -> &'static str {
        self.kind.namespace()
    }

    /// Write `entries` to this destination in one transaction
    pub fn write_range(
        &self,
        ctx: &OperationContext,
        engine: &dyn StorageEngine,
        entries: &[Entry],
    ) -> StorageResult<()> {
        (self.write_range)(ctx, engine, entries)
    }
}

impl fmt::Debug for WriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteTarget")
            .field("kind", &self.kind)
            .finish()
    }
}

/// Insert a range into the log store and commit
pub fn write_log_store_range(
    ctx: &OperationContext,
    engine: &dyn StorageEngine,
    entries: &[Entry],
) -> StorageResult<()> {
    write_range_to(TargetKind::LogStore, ctx, engine, entries)
}

/// Insert a range into the change feed and commit
pub fn write_change_feed_range(
    ctx: &OperationContext,
    engine: &dyn StorageEngine,
    entries: &[Entry],
) -> StorageResult<()> {
    write_range_to(TargetKind::ChangeFeed, ctx, engine, entries)
}

fn write_range_to(
    kind: TargetKind,
    ctx: &OperationContext,
    engine: &dyn StorageEngine,
    entries: &[Entry],
) -> StorageResult<()> {
    if !engine.has_target(kind) {
        return Err(StorageError::NamespaceNotFound(kind.namespace().to_string()));
    }
    let mut txn = engine.begin(ctx)?;
    txn.insert_ordered(kind, entries)?;
    txn.commit()
}
