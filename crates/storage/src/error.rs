//! Storage engine errors

use crate::target::TargetKind;
use logwriter_concurrency::AdmissionError;
use logwriter_core::{EntryId, Error};
use thiserror::Error;

/// Errors reported by a storage engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Another transaction touched the same data; retry
    #[error("write conflict")]
    WriteConflict,

    /// A lock could not be acquired in time; retry
    #[error("lock timeout")]
    LockTimeout,

    /// The transaction exceeded the engine's size limit
    #[error("transaction too large")]
    TransactionTooLarge,

    /// The target does not exist
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    /// Insert would not extend the target in order
    #[error("out of order insert into {target}: {next} is not after {last}")]
    OutOfOrder {
        /// Namespace of the target
        target: String,
        /// Highest id already present or staged
        last: EntryId,
        /// Offending id
        next: EntryId,
    },

    /// Shutdown was requested during the operation
    #[error("interrupted at shutdown")]
    InterruptedAtShutdown,

    /// The admission controller refused the operation
    #[error("admission: {0}")]
    Admission(#[from] AdmissionError),

    /// Engine failure that is not expected to clear on retry
    #[error("{0}")]
    Internal(String),
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Check if retrying the same write may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::WriteConflict | StorageError::LockTimeout | StorageError::Admission(_)
        )
    }

    /// Convert into the write path error for `target`
    pub fn into_error(self, target: TargetKind) -> Error {
        match self {
            StorageError::InterruptedAtShutdown => Error::InterruptedAtShutdown,
            StorageError::NamespaceNotFound(ns) => Error::MissingTarget(ns),
            other => Error::Storage {
                target: target.namespace().to_string(),
                message: other.to_string(),
            },
        }
    }
}
