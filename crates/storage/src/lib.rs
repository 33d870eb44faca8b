//! Storage layer for the log write path
//!
//! This crate defines the boundary to the storage engine and the adapter
//! logic that sits directly on top of it:
//! - [`StorageEngine`] / [`StorageTransaction`]: the engine interface
//! - [`WriteTarget`]: a named destination plus the function that writes one
//!   contiguous range of entries to it in one transaction
//! - [`insert_batch_with_retry`]: bounded retry of transient failures
//! - [`InMemoryEngine`]: a complete ordered in-memory engine

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod journal;
pub mod memory;
pub mod retry;
pub mod target;

pub use engine::{StorageEngine, StorageTransaction};
pub use error::{StorageError, StorageResult};
pub use journal::JournalMode;
pub use memory::{InMemoryEngine, WriteRecord};
pub use retry::{insert_batch_with_retry, RetryPolicy};
pub use target::{
    write_change_feed_range, write_log_store_range, TargetKind, WriteRangeFn, WriteTarget,
};
