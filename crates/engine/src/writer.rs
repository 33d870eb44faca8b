//! Persistence of one batch to every write target
//!
//! Targets are written in order, log store first, each in its own
//! transaction and each with its own retry budget. Every write runs with
//! exempt admission priority and with write re-logging switched off; both
//! are restored when the write returns, on every path.
//!
//! A crash between the two targets leaves the change feed behind the log
//! store. That state is recoverable by replay from the log store, so the
//! targets are never combined into one transaction.

use crate::batcher::Batch;
use crate::config::WriterOptions;
use crate::metrics::MetricsSink;
use crate::observer::WriteObserver;
use logwriter_concurrency::{
    AdmissionPriority, OperationContext, ScopedAdmissionPriority, ShutdownSignal,
    UnreplicatedWritesBlock,
};
use logwriter_core::{EntryId, Error, Result};
use logwriter_storage::{insert_batch_with_retry, RetryPolicy, StorageEngine, TargetKind, WriteTarget};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// A batch write that did not reach every target
#[derive(Debug, Error)]
#[error("{error} (log store committed: {log_store_committed})")]
pub struct WriteFailure {
    /// What went wrong
    pub error: Error,
    /// Whether the log store already holds the batch
    pub log_store_committed: bool,
}

/// Writes batches to the configured targets
pub struct PersistenceAdapter {
    engine: Arc<dyn StorageEngine>,
    targets: Vec<WriteTarget>,
    skip_log_store_writes: bool,
    retry: RetryPolicy,
    observer: Arc<dyn WriteObserver>,
    metrics: Arc<dyn MetricsSink>,
}

impl PersistenceAdapter {
    /// Create an adapter for `options`
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        options: &WriterOptions,
        observer: Arc<dyn WriteObserver>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let mut targets = vec![WriteTarget::log_store()];
        if options.write_change_feed {
            targets.push(WriteTarget::change_feed());
        }
        Self {
            engine,
            targets,
            skip_log_store_writes: options.skip_log_store_writes,
            retry: options.retry,
            observer,
            metrics,
        }
    }

    /// Targets written for every batch, in order
    pub fn targets(&self) -> &[WriteTarget] {
        &self.targets
    }

    /// Fail if any target this adapter writes does not exist
    pub fn check_targets(&self) -> Result<()> {
        for target in &self.targets {
            if !self.engine.has_target(target.kind()) {
                return Err(Error::MissingTarget(target.namespace().to_string()));
            }
        }
        Ok(())
    }

    /// Write `batch` to every target
    ///
    /// Returns the id of the last entry in the log store range.
    pub fn write_batch(
        &self,
        ctx: &OperationContext,
        batch: &Batch,
        shutdown: &ShutdownSignal,
    ) -> std::result::Result<EntryId, WriteFailure> {
        let last = batch.last_id().ok_or_else(|| WriteFailure {
            error: Error::Internal("cannot write an empty batch".into()),
            log_store_committed: false,
        })?;

        let start = Instant::now();
        self.metrics.record_batch_size(batch.len());

        let mut log_store_committed = false;
        for target in &self.targets {
            let kind = target.kind();
            if kind == TargetKind::LogStore && self.skip_log_store_writes {
                log_store_committed = true;
                continue;
            }

            self.write_target(ctx, target, batch, shutdown)
                .map_err(|error| WriteFailure {
                    error,
                    log_store_committed,
                })?;

            match kind {
                TargetKind::LogStore => {
                    log_store_committed = true;
                    self.observer.on_write_log_store(batch.entries());
                }
                TargetKind::ChangeFeed => self.observer.on_write_change_feed(batch.entries()),
            }
        }

        let elapsed = start.elapsed();
        self.metrics.record_batch_duration(elapsed);
        tracing::debug!(
            entries = batch.len(),
            bytes = batch.byte_size(),
            last = %last,
            elapsed_us = elapsed.as_micros() as u64,
            "Batch written"
        );
        Ok(last)
    }

    fn write_target(
        &self,
        ctx: &OperationContext,
        target: &WriteTarget,
        batch: &Batch,
        shutdown: &ShutdownSignal,
    ) -> Result<()> {
        let _priority = ScopedAdmissionPriority::new(ctx, AdmissionPriority::Exempt);
        let _unreplicated = UnreplicatedWritesBlock::new(ctx);
        insert_batch_with_retry(
            ctx,
            self.engine.as_ref(),
            target,
            batch.entries(),
            &self.retry,
            shutdown,
        )
    }
}

impl std::fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("targets", &self.targets)
            .field("skip_log_store_writes", &self.skip_log_store_writes)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{NoopMetrics, WriterStats};
    use crate::observer::NoopObserver;
    use logwriter_concurrency::AdmissionController;
    use logwriter_core::{Entry, Timestamp};
    use logwriter_storage::{InMemoryEngine, StorageError};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingObserver {
        calls: Mutex<Vec<(TargetKind, usize)>>,
    }

    impl WriteObserver for RecordingObserver {
        fn on_write_log_store(&self, entries: &[Entry]) {
            self.calls.lock().push((TargetKind::LogStore, entries.len()));
        }
        fn on_write_change_feed(&self, entries: &[Entry]) {
            self.calls.lock().push((TargetKind::ChangeFeed, entries.len()));
        }
    }

    fn batch(n: u32) -> Batch {
        Batch::new(
            (1..=n)
                .map(|i| Entry::now(Timestamp::new(50, i), 1, vec![1u8]))
                .collect(),
            true,
        )
    }

    fn options(write_change_feed: bool) -> WriterOptions {
        WriterOptions {
            write_change_feed,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
            ..WriterOptions::default()
        }
    }

    fn adapter(engine: &Arc<InMemoryEngine>, options: &WriterOptions) -> PersistenceAdapter {
        PersistenceAdapter::new(
            engine.clone(),
            options,
            Arc::new(NoopObserver),
            Arc::new(NoopMetrics),
        )
    }

    #[test]
    fn test_writes_both_targets_and_returns_last_id() {
        let engine = Arc::new(InMemoryEngine::new());
        let observer = Arc::new(RecordingObserver::default());
        let stats = Arc::new(WriterStats::new());
        let adapter = PersistenceAdapter::new(
            engine.clone(),
            &options(true),
            observer.clone(),
            stats.clone(),
        );
        let ctx = OperationContext::new("writer");
        let b = batch(3);

        let last = adapter
            .write_batch(&ctx, &b, &ShutdownSignal::new())
            .unwrap();

        assert_eq!(last, b.last_id().unwrap());
        assert_eq!(engine.entries(TargetKind::LogStore).len(), 3);
        assert_eq!(engine.entries(TargetKind::ChangeFeed).len(), 3);
        assert_eq!(
            *observer.calls.lock(),
            vec![(TargetKind::LogStore, 3), (TargetKind::ChangeFeed, 3)]
        );
        assert_eq!(stats.report().batch_size, 3);
        assert_eq!(stats.report().batches.num, 1);
    }

    #[test]
    fn test_writes_run_exempt_and_unreplicated_then_restore() {
        let engine = Arc::new(
            InMemoryEngine::builder()
                .admission(AdmissionController::new(0), Duration::from_millis(5))
                .build(),
        );
        let adapter = adapter(&engine, &options(true));
        let ctx = OperationContext::new("writer");

        adapter
            .write_batch(&ctx, &batch(2), &ShutdownSignal::new())
            .unwrap();

        for record in engine.write_records() {
            assert_eq!(record.priority, AdmissionPriority::Exempt);
            assert!(!record.replicated);
        }
        assert_eq!(ctx.priority(), AdmissionPriority::Normal);
        assert!(ctx.writes_are_replicated());
    }

    #[test]
    fn test_guards_restored_on_failure() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.inject_failures(
            TargetKind::LogStore,
            vec![StorageError::Internal("corrupt".into())],
        );
        let adapter = adapter(&engine, &options(false));
        let ctx = OperationContext::new("writer");

        let failure = adapter
            .write_batch(&ctx, &batch(1), &ShutdownSignal::new())
            .unwrap_err();
        assert!(failure.error.is_fatal());
        assert!(!failure.log_store_committed);
        assert_eq!(ctx.priority(), AdmissionPriority::Normal);
        assert!(ctx.writes_are_replicated());
    }

    #[test]
    fn test_change_feed_retry_does_not_rewrite_log_store() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.inject_failures(
            TargetKind::ChangeFeed,
            vec![StorageError::WriteConflict, StorageError::WriteConflict],
        );
        let adapter = adapter(&engine, &options(true));

        adapter
            .write_batch(&OperationContext::new("writer"), &batch(3), &ShutdownSignal::new())
            .unwrap();

        assert_eq!(engine.commit_count(TargetKind::LogStore), 1);
        assert_eq!(engine.commit_count(TargetKind::ChangeFeed), 1);
    }

    #[test]
    fn test_change_feed_exhaustion_reports_log_store_committed() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.inject_failures(TargetKind::ChangeFeed, vec![StorageError::LockTimeout; 3]);
        let adapter = adapter(&engine, &options(true));

        let failure = adapter
            .write_batch(&OperationContext::new("writer"), &batch(2), &ShutdownSignal::new())
            .unwrap_err();
        assert!(matches!(failure.error, Error::RetriesExhausted { .. }));
        assert!(failure.log_store_committed);
    }

    #[test]
    fn test_skip_log_store_writes() {
        let engine = Arc::new(InMemoryEngine::new());
        let adapter = adapter(
            &engine,
            &WriterOptions {
                skip_log_store_writes: true,
                ..options(true)
            },
        );
        let b = batch(2);

        let last = adapter
            .write_batch(&OperationContext::new("writer"), &b, &ShutdownSignal::new())
            .unwrap();
        assert_eq!(last, b.last_id().unwrap());
        assert!(engine.entries(TargetKind::LogStore).is_empty());
        assert_eq!(engine.entries(TargetKind::ChangeFeed).len(), 2);
    }

    #[test]
    fn test_check_targets() {
        let engine = Arc::new(
            InMemoryEngine::builder()
                .without_target(TargetKind::ChangeFeed)
                .build(),
        );
        assert!(adapter(&engine, &options(false)).check_targets().is_ok());
        let err = adapter(&engine, &options(true)).check_targets().unwrap_err();
        assert!(matches!(err, Error::MissingTarget(ns) if ns == "config.changes"));
    }
}
