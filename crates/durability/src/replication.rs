//! Replication coordinator boundary
//!
//! The write loop only touches the replication layer through
//! [`ReplicationCoordinator`]: it pushes the last-written watermark forward
//! after each batch and gives the node a chance to finish recovery between
//! batches. [`LocalReplicationState`] is the single-node implementation.

use crate::watermark::DurabilityWatermark;
use logwriter_core::{EntryIdAndWallTime, Result};
use logwriter_storage::{StorageEngine, TargetKind};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Calls the write path makes into the replication layer
pub trait ReplicationCoordinator: Send + Sync {
    /// Advance last-written to `value` if it is newer
    fn set_my_last_written_forward(&self, value: EntryIdAndWallTime);

    /// Advance last-durable to `value` if it is newer
    fn set_my_last_durable_forward(&self, value: EntryIdAndWallTime);

    /// Highest entry written and visible on this node
    fn last_written(&self) -> EntryIdAndWallTime;

    /// Highest entry known flushed to the journal on this node
    fn last_durable(&self) -> EntryIdAndWallTime;

    /// Leave recovery if the node has become eligible
    ///
    /// Returns `true` if the member state changed.
    fn attempt_local_role_transition(&self) -> bool;
}

/// Member state of the local node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    /// Not yet recovered from the log store
    Startup,
    /// Replaying or catching up; not yet serving reads
    Recovering,
    /// Caught up
    Secondary,
}

impl fmt::Display for MemberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberState::Startup => "STARTUP",
            MemberState::Recovering => "RECOVERING",
            MemberState::Secondary => "SECONDARY",
        };
        f.write_str(s)
    }
}

/// Replication state of a single node
#[derive(Debug)]
pub struct LocalReplicationState {
    last_written: DurabilityWatermark,
    last_durable: DurabilityWatermark,
    state: Mutex<MemberState>,
    eligible: AtomicBool,
}

impl LocalReplicationState {
    /// Create state for a node that has not recovered yet
    pub fn new() -> Self {
        Self {
            last_written: DurabilityWatermark::new("last_written"),
            last_durable: DurabilityWatermark::new("last_durable"),
            state: Mutex::new(MemberState::Startup),
            eligible: AtomicBool::new(false),
        }
    }

    /// Seed both watermarks from the log store's highest entry
    ///
    /// Everything already in the log store was durable before this process
    /// started. Moves the node to [`MemberState::Recovering`].
    pub fn recover_from(&self, engine: &dyn StorageEngine) -> Result<()> {
        let last = engine
            .last_entry_id(TargetKind::LogStore)
            .map_err(|e| e.into_error(TargetKind::LogStore))?;
        let mut seeded = EntryIdAndWallTime::null();
        if let Some(id) = last {
            seeded.id = id;
        }
        self.last_written.reset_to(seeded);
        self.last_durable.reset_to(seeded);
        *self.state.lock() = MemberState::Recovering;
        tracing::info!(last_written = %seeded.id, "Recovered replication state from log store");
        Ok(())
    }

    /// Allow the next role transition attempt to leave recovery
    pub fn mark_eligible(&self) {
        self.eligible.store(true, Ordering::SeqCst);
    }

    /// Current member state
    pub fn member_state(&self) -> MemberState {
        *self.state.lock()
    }
}

impl Default for LocalReplicationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationCoordinator for LocalReplicationState {
    fn set_my_last_written_forward(&self, value: EntryIdAndWallTime) {
        self.last_written.advance_to(value);
    }

    fn set_my_last_durable_forward(&self, value: EntryIdAndWallTime) {
        self.last_durable.advance_to(value);
    }

    fn last_written(&self) -> EntryIdAndWallTime {
        self.last_written.get()
    }

    fn last_durable(&self) -> EntryIdAndWallTime {
        self.last_durable.get()
    }

    fn attempt_local_role_transition(&self) -> bool {
        if !self.eligible.load(Ordering::SeqCst) {
            return false;
        }
        let mut state = self.state.lock();
        if *state != MemberState::Recovering {
            return false;
        }
        *state = MemberState::Secondary;
        tracing::info!(from = %MemberState::Recovering, to = %MemberState::Secondary, "Member state changed");
        true
    }
}
