//! Durability layer for the log write path
//!
//! After a batch commits, three things happen in a fixed order:
//! - the storage engine's visible position moves to the batch's last entry
//! - the node's last-written watermark moves forward to the same entry
//! - a journal flush is requested (unless the engine is ephemeral)
//!
//! The flush runs on its own thread and moves the last-durable watermark
//! once the engine reports the journal flushed. Nothing here waits for it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod flusher;
pub mod replication;
pub mod watermark;

pub use coordinator::DurabilityCoordinator;
pub use flusher::{FlushTrigger, JournalFlusher, NoopFlushTrigger};
pub use replication::{LocalReplicationState, MemberState, ReplicationCoordinator};
pub use watermark::DurabilityWatermark;
