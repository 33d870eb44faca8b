//! Monotonic entry watermark

use logwriter_core::{EntryId, EntryIdAndWallTime};
use parking_lot::Mutex;

/// Highest entry known to have reached some durability level
///
/// `advance_to` is a monotonic max over [`EntryId`] order. The write loop is
/// the only writer in practice, but concurrent callers are safe.
#[derive(Debug)]
pub struct DurabilityWatermark {
    name: &'static str,
    value: Mutex<EntryIdAndWallTime>,
}

impl DurabilityWatermark {
    /// Create a watermark at the null id
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Mutex::new(EntryIdAndWallTime::null()),
        }
    }

    /// Current value
    pub fn get(&self) -> EntryIdAndWallTime {
        *self.value.lock()
    }

    /// Current id
    pub fn id(&self) -> EntryId {
        self.value.lock().id
    }

    /// Move forward to `next` if it is newer
    ///
    /// Returns `true` if the watermark moved.
    pub fn advance_to(&self, next: EntryIdAndWallTime) -> bool {
        let mut value = self.value.lock();
        if next.id <= value.id {
            return false;
        }
        tracing::trace!(watermark = self.name, from = %value.id, to = %next.id, "Watermark advanced");
        *value = next;
        true
    }

    /// Overwrite unconditionally
    ///
    /// Only for seeding at startup from the log store's highest entry.
    pub fn reset_to(&self, value: EntryIdAndWallTime) {
        tracing::debug!(watermark = self.name, to = %value.id, "Watermark reset");
        *self.value.lock() = value;
    }
}
