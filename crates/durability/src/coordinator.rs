//! Post-commit durability steps
//!
//! `finalize` runs after every batch is committed to the log store:
//!
//! ```text
//!   register_visible_position(last.ts, ordered)   readers may see `last`
//!            |
//!   set_my_last_written_forward(last)             watermark moves
//!            |
//!   request_flush()                               flusher reads last-written
//! ```
//!
//! The flusher reads last-written to decide what a flush covers, so the
//! watermark has to move before the flush is requested.

use crate::flusher::FlushTrigger;
use crate::replication::ReplicationCoordinator;
use logwriter_core::{EntryIdAndWallTime, Result};
use logwriter_storage::{StorageEngine, TargetKind};
use std::sync::Arc;

/// Advances visibility and durability markers after a batch commits
#[derive(Clone)]
pub struct DurabilityCoordinator {
    engine: Arc<dyn StorageEngine>,
    replication: Arc<dyn ReplicationCoordinator>,
    flush: Arc<dyn FlushTrigger>,
}

impl DurabilityCoordinator {
    /// Create a coordinator
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        replication: Arc<dyn ReplicationCoordinator>,
        flush: Arc<dyn FlushTrigger>,
    ) -> Self {
        Self {
            engine,
            replication,
            flush,
        }
    }

    /// Replication coordinator this instance reports to
    pub fn replication(&self) -> &Arc<dyn ReplicationCoordinator> {
        &self.replication
    }

    /// Make `last` visible, advance last-written, then maybe request a flush
    pub fn finalize(&self, last: EntryIdAndWallTime, flush_requested: bool) -> Result<()> {
        self.engine
            .register_visible_position(last.id.timestamp, true)
            .map_err(|e| e.into_error(TargetKind::LogStore))?;
        self.replication.set_my_last_written_forward(last);
        if flush_requested {
            self.flush.request_flush();
        }
        Ok(())
    }
}

impl std::fmt::Debug for DurabilityCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurabilityCoordinator")
            .field("visible", &self.engine.visible_position())
            .field("last_written", &self.replication.last_written().id)
            .finish()
    }
}
