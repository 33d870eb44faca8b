//! Core types for the log write path
//!
//! This crate defines the types shared by every layer:
//! - [`Timestamp`]: 64-bit logical clock value
//! - [`EntryId`]: total order key for log entries
//! - [`Entry`]: an immutable log entry with an opaque payload
//! - [`Error`]: canonical error type surfaced to the write loop

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entry;
pub mod error;
pub mod types;

pub use entry::Entry;
pub use error::{Error, Result};
pub use types::{EntryId, EntryIdAndWallTime, Term, Timestamp};
