//! Journal mode for a storage engine.
//!
//! Defines whether committed writes need a separate durability barrier.

/// Journal mode for an engine.
///
/// Controls whether the write path has to trigger a journal flush after a
/// batch commits.
///
/// # Mode Comparison
///
/// | Mode | Journal flush | Use Case |
/// |------|---------------|----------|
/// | Ephemeral | Never | Tests, in-memory nodes |
/// | Journaled | After every batch (async) | Production |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalMode {
    /// No journal - all data lost on crash.
    ///
    /// Commits are the only barrier; there is nothing to flush.
    Ephemeral,

    /// Commits land in a write-ahead journal that is flushed separately.
    ///
    /// The write path triggers a flush after each batch without waiting
    /// for it; the durable marker catches up asynchronously.
    #[default]
    Journaled,
}

impl JournalMode {
    /// Check if this mode has a separate durability barrier.
    ///
    /// Returns false for Ephemeral, true for Journaled.
    pub fn requires_flush(&self) -> bool {
        matches!(self, JournalMode::Journaled)
    }
}
