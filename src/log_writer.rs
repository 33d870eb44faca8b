//! Main entry point for Logwriter.
//!
//! [`LogWriter`] wires a storage engine to a running write loop: it builds
//! both buffers, recovers the watermarks from the log store, starts the
//! journal flusher when the engine has a journal, and spawns the loop.

use logwriter_concurrency::{BoundedBuffer, PauseSignal, ShutdownSignal};
use logwriter_core::{Entry, Error, Result};
use logwriter_durability::{JournalFlusher, LocalReplicationState, ReplicationCoordinator};
use logwriter_engine::{
    LoopExit, LoopState, NoopObserver, WriteLoop, WriteLoopHandle, WriteObserver, WriterConfig,
    WriterOptions, WriterReport, WriterStats,
};
use logwriter_storage::StorageEngine;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// A running log writer.
///
/// # Example
///
/// ```no_run
/// use logwriter::prelude::*;
/// use std::sync::Arc;
///
/// # fn main() -> logwriter::Result<()> {
/// let writer = LogWriter::builder(Arc::new(InMemoryEngine::new()))
///     .config(WriterConfig {
///         write_change_feed: true,
///         ..WriterConfig::default()
///     })
///     .start()?;
///
/// writer.append(vec![Entry::now(Timestamp::new(1, 1), 1, b"op".to_vec())])?;
/// writer.close()?;
/// # Ok(())
/// # }
/// ```
pub struct LogWriter {
    engine: Arc<dyn StorageEngine>,
    options: WriterOptions,
    inbound: Arc<BoundedBuffer<Entry>>,
    outbound: Arc<BoundedBuffer<Entry>>,
    replication: Arc<LocalReplicationState>,
    flusher: Option<Arc<JournalFlusher>>,
    stats: Arc<WriterStats>,
    shutdown: ShutdownSignal,
    handle: Option<WriteLoopHandle>,
}

impl LogWriter {
    /// Create a builder over `engine`.
    pub fn builder(engine: Arc<dyn StorageEngine>) -> LogWriterBuilder {
        LogWriterBuilder::new(engine)
    }

    /// Append entries to the inbound buffer.
    ///
    /// Blocks while the inbound buffer is full. Entries must arrive in
    /// strictly increasing id order; the write loop stops the process on
    /// the first violation.
    pub fn append(&self, entries: Vec<Entry>) -> Result<()> {
        self.inbound.push(entries, &self.shutdown).map_err(Error::from)
    }

    /// Buffer of entries waiting to be persisted.
    pub fn inbound(&self) -> &Arc<BoundedBuffer<Entry>> {
        &self.inbound
    }

    /// Buffer of persisted entries for the downstream consumer.
    pub fn outbound(&self) -> &Arc<BoundedBuffer<Entry>> {
        &self.outbound
    }

    /// Shutdown signal shared by every component.
    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Replication state fed by the write loop.
    pub fn replication(&self) -> &Arc<LocalReplicationState> {
        &self.replication
    }

    /// Resolved options the loop runs with.
    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Batch counters.
    pub fn report(&self) -> WriterReport {
        self.stats.report()
    }

    /// Batch counters as JSON.
    pub fn report_json(&self) -> serde_json::Result<serde_json::Value> {
        self.stats.report_json()
    }

    /// Current write loop state.
    pub fn state(&self) -> LoopState {
        self.handle
            .as_ref()
            .map_or(LoopState::Stopped, WriteLoopHandle::state)
    }

    /// Wait until the write loop reaches `state`.
    pub fn wait_for_state(&self, state: LoopState, timeout: Duration) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.wait_for_state(state, timeout))
    }

    /// Pause the write loop at the top of its next iteration.
    pub fn pause(&self) {
        if let Some(handle) = &self.handle {
            handle.pause();
        }
    }

    /// Resume a paused write loop.
    pub fn resume(&self) {
        if let Some(handle) = &self.handle {
            handle.resume();
        }
    }

    /// Stop the write loop and flush the journal one last time.
    ///
    /// Entries still in the inbound buffer are persisted first, as far as
    /// the outbound buffer has room for them; the rest stay in the inbound
    /// buffer. Returns the loop's exit reason, or the fatal error that
    /// stopped it.
    pub fn close(mut self) -> Result<LoopExit> {
        self.stop()
    }

    fn stop(&mut self) -> Result<LoopExit> {
        let Some(handle) = self.handle.take() else {
            return Err(Error::Internal("log writer already closed".into()));
        };
        self.shutdown.request();
        let exit = handle.join();

        if let Some(flusher) = self.flusher.take() {
            flusher.shutdown();
            let last = self.replication.last_written();
            self.engine
                .flush_journal()
                .map_err(|e| e.into_error(logwriter_storage::TargetKind::LogStore))?;
            self.replication.set_my_last_durable_forward(last);
        }
        exit
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.stop() {
                tracing::error!(error = %e, "Log writer stopped with error on drop");
            }
        }
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("state", &self.state())
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .field("last_written", &self.replication.last_written().id)
            .finish()
    }
}

/// Builder for [`LogWriter`].
pub struct LogWriterBuilder {
    engine: Arc<dyn StorageEngine>,
    config: WriterConfig,
    observer: Arc<dyn WriteObserver>,
    pause: PauseSignal,
}

impl LogWriterBuilder {
    fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            engine,
            config: WriterConfig::default(),
            observer: Arc::new(NoopObserver),
            pause: PauseSignal::new(),
        }
    }

    /// Use `config`.
    pub fn config(mut self, config: WriterConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from a TOML file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = WriterConfig::from_file(path)?;
        Ok(self)
    }

    /// Observer called after each target write.
    pub fn observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start with the loop paused.
    pub fn paused(self) -> Self {
        self.pause.pause();
        self
    }

    /// Recover, start the flusher and spawn the write loop.
    pub fn start(self) -> Result<LogWriter> {
        let options = self.config.resolve()?;
        let shutdown = ShutdownSignal::new();
        let inbound = BoundedBuffer::with_shutdown("inbound", options.inbound_capacity, &shutdown);
        let outbound =
            BoundedBuffer::with_shutdown("outbound", options.outbound_capacity, &shutdown);

        let replication = Arc::new(LocalReplicationState::new());
        replication.recover_from(self.engine.as_ref())?;

        let flusher = if options.flush_journal && !self.engine.is_ephemeral() {
            let coordinator: Arc<dyn ReplicationCoordinator> = replication.clone();
            Some(Arc::new(JournalFlusher::spawn(
                Arc::clone(&self.engine),
                coordinator,
                &shutdown,
            )?))
        } else {
            None
        };

        let stats = Arc::new(WriterStats::new());
        let mut builder = WriteLoop::builder(
            Arc::clone(&self.engine),
            Arc::clone(&inbound),
            Arc::clone(&outbound),
        )
        .options(options.clone())
        .replication(replication.clone())
        .observer(self.observer)
        .metrics(stats.clone())
        .shutdown(shutdown.clone())
        .pause(self.pause);
        if let Some(flusher) = &flusher {
            builder = builder.flush_trigger(flusher.clone());
        }
        let handle = builder.build().spawn()?;

        tracing::info!(
            last_written = %replication.last_written().id,
            change_feed = options.write_change_feed,
            journal = flusher.is_some(),
            "Log writer started"
        );

        Ok(LogWriter {
            engine: self.engine,
            options,
            inbound,
            outbound,
            replication,
            flusher,
            stats,
            shutdown,
            handle: Some(handle),
        })
    }
}
