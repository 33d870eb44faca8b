//! Write path metrics
//!
//! The loop reports through a [`MetricsSink`] passed in at construction;
//! nothing in the write path reads metrics back.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Receiver of write path measurements
pub trait MetricsSink: Send + Sync {
    /// One batch of `entries` entries was written
    fn record_batch_size(&self, entries: usize);

    /// Writing one batch to every target took `elapsed`
    fn record_batch_duration(&self, elapsed: Duration);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_batch_size(&self, _entries: usize) {}
    fn record_batch_duration(&self, _elapsed: Duration) {}
}

/// Counter and timer for batch writes
#[derive(Debug, Default)]
pub struct WriterStats {
    batch_size: AtomicU64,
    batches: AtomicU64,
    batch_micros: AtomicU64,
}

/// Timer section of [`WriterReport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerReport {
    /// Number of timed batches
    pub num: u64,
    /// Total time spent writing, in milliseconds
    pub total_millis: u64,
}

/// Snapshot of [`WriterStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterReport {
    /// Total entries written
    pub batch_size: u64,
    /// Batch write timer
    pub batches: TimerReport,
}

impl WriterStats {
    /// Create zeroed stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Current values
    pub fn report(&self) -> WriterReport {
        WriterReport {
            batch_size: self.batch_size.load(Ordering::Relaxed),
            batches: TimerReport {
                num: self.batches.load(Ordering::Relaxed),
                total_millis: self.batch_micros.load(Ordering::Relaxed) / 1000,
            },
        }
    }

    /// Current values as a JSON document
    pub fn report_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.report())
    }
}

impl MetricsSink for WriterStats {
    fn record_batch_size(&self, entries: usize) {
        self.batch_size.fetch_add(entries as u64, Ordering::Relaxed);
    }

    fn record_batch_duration(&self, elapsed: Duration) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.batch_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }
}
