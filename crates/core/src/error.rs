//! Canonical error type for the write path
//!
//! Every failure surfaced to the write loop is one of two kinds:
//! - the expected shutdown signal ([`Error::InterruptedAtShutdown`]), which
//!   ends the loop cleanly
//! - anything else, which is fatal because skipping or half-applying a
//!   batch would break the total-order durability contract
//!
//! Transient storage conditions never reach this type directly; they are
//! retried below and only surface here as [`Error::RetriesExhausted`].

use crate::types::EntryId;
use thiserror::Error;

/// All write path errors
#[derive(Debug, Error)]
pub enum Error {
    /// Shutdown was requested while the operation was in progress
    #[error("interrupted at shutdown")]
    InterruptedAtShutdown,

    /// A storage target could not be written
    #[error("storage error on {target}: {message}")]
    Storage {
        /// Namespace of the target
        target: String,
        /// Error reported by the storage engine
        message: String,
    },

    /// Transient storage failures persisted past the retry budget
    #[error("write to {target} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Namespace of the target
        target: String,
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        last_error: String,
    },

    /// A required storage target does not exist
    #[error("missing storage target: {0}")]
    MissingTarget(String),

    /// Entries within a batch are not strictly increasing
    #[error("batch out of order: {previous} is not before {next}")]
    OutOfOrder {
        /// Earlier entry in the batch
        previous: EntryId,
        /// Entry that does not sort after it
        next: EntryId,
    },

    /// The persisted id does not match the batch's last id
    #[error("persisted entry {persisted} does not match batch end {expected}")]
    PersistedMismatch {
        /// Last id of the batch
        expected: EntryId,
        /// Id returned by the persistence adapter
        persisted: EntryId,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for write path operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is the clean shutdown signal
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::InterruptedAtShutdown)
    }

    /// Check if this error must stop the process
    ///
    /// Everything except the shutdown signal is fatal.
    pub fn is_fatal(&self) -> bool {
        !self.is_interrupted()
    }

    /// Check if this error indicates a broken ordering invariant
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            Error::OutOfOrder { .. } | Error::PersistedMismatch { .. }
        )
    }
}
