//! Hooks run after each successful target write

use logwriter_core::Entry;

/// Observer of committed ranges
///
/// Called on the write loop thread right after the target's transaction
/// commits, so implementations must not block.
pub trait WriteObserver: Send + Sync {
    /// `entries` were committed to the log store
    fn on_write_log_store(&self, _entries: &[Entry]) {}

    /// `entries` were committed to the change feed
    fn on_write_change_feed(&self, _entries: &[Entry]) {}
}

/// Observer that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WriteObserver for NoopObserver {}
