//! Log entries
//!
//! An [`Entry`] is immutable once produced. The payload is opaque to the
//! write path and shared by reference count, so handing a persisted batch
//! to the downstream buffer never copies payload bytes.

use crate::types::{EntryId, EntryIdAndWallTime, Term, Timestamp};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    id: EntryId,
    wall_time: DateTime<Utc>,
    payload: Arc<[u8]>,
}

impl Entry {
    /// Create an entry from its id, wall time and payload
    pub fn new(id: EntryId, wall_time: DateTime<Utc>, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id,
            wall_time,
            payload: payload.into(),
        }
    }

    /// Create an entry stamped with the current wall clock time
    pub fn now(timestamp: Timestamp, term: Term, payload: impl Into<Arc<[u8]>>) -> Self {
        Self::new(EntryId::new(timestamp, term), Utc::now(), payload)
    }

    /// Order key of this entry
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Logical timestamp of this entry
    pub fn timestamp(&self) -> Timestamp {
        self.id.timestamp
    }

    /// Leadership term of this entry
    pub fn term(&self) -> Term {
        self.id.term
    }

    /// Wall clock time recorded by the producer
    pub fn wall_time(&self) -> DateTime<Utc> {
        self.wall_time
    }

    /// Id and wall time together
    pub fn id_and_wall_time(&self) -> EntryIdAndWallTime {
        EntryIdAndWallTime::new(self.id, self.wall_time)
    }

    /// Opaque payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
