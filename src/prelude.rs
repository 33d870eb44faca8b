//! Convenient imports for Logwriter.
//!
//! ```no_run
//! use logwriter::prelude::*;
//! ```

// Main entry point
pub use crate::log_writer::{LogWriter, LogWriterBuilder};

// Error handling
pub use logwriter_core::{Error, Result};

// Data model
pub use logwriter_core::{Entry, EntryId, EntryIdAndWallTime, Term, Timestamp};

// Buffers and signals
pub use logwriter_concurrency::{BoundedBuffer, PauseSignal, ShutdownSignal};

// Storage
pub use logwriter_storage::{InMemoryEngine, JournalMode, StorageEngine, TargetKind};

// Replication boundary
pub use logwriter_durability::{LocalReplicationState, MemberState, ReplicationCoordinator};

// Write loop
pub use logwriter_engine::{
    FatalPolicy, LoopExit, LoopState, WriteObserver, WriterConfig, WriterReport,
};
